//! Legacy EIP-155 transactions for EVM chains

use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_eips::eip2718::Encodable2718;
use alloy_primitives::{Address, Bytes, TxKind, U256};
use k256::ecdsa::VerifyingKey;
use nexum_tapcard::RawSignature;

use crate::signature::{bind, expect_count};
use crate::transaction::{UnsignedBody, UnsignedTransaction};
use crate::wallet::{ChainReference, TokenDebit, TransferIntent, WalletState, ensure_funds};
use crate::{ChainFamily, Error, Result, SignedTransaction};

/// Destination address, checksum verified when the input is mixed case
fn parse_address(address: &str) -> Result<Address> {
    let digits = address.strip_prefix("0x").unwrap_or(address);
    let mixed_case = digits.chars().any(|c| c.is_ascii_uppercase())
        && digits.chars().any(|c| c.is_ascii_lowercase());

    if mixed_case {
        Address::parse_checksummed(address, None)
            .map_err(|_| Error::invalid_address(address, "bad EIP-55 checksum"))
    } else {
        address
            .parse::<Address>()
            .map_err(|_| Error::invalid_address(address, "not a 20-byte hex address"))
    }
}

/// Selector of ERC-20 `transfer(address,uint256)`
pub const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// ABI encoded call data of `transfer(to, amount)`
pub fn transfer_call(to: Address, amount: U256) -> Bytes {
    let mut data = Vec::with_capacity(4 + 64);
    data.extend_from_slice(&TRANSFER_SELECTOR);
    data.extend_from_slice(&[0u8; 12]);
    data.extend_from_slice(to.as_slice());
    data.extend_from_slice(&amount.to_be_bytes::<32>());
    Bytes::from(data)
}

/// Tokens a transaction moves, when it is an ERC-20 transfer call
pub(crate) fn token_debit(tx: &TxLegacy) -> Option<TokenDebit> {
    let TxKind::Call(contract) = tx.to else {
        return None;
    };
    let data = tx.input.as_ref();
    if data.len() != 68 || data[..4] != TRANSFER_SELECTOR {
        return None;
    }
    Some(TokenDebit {
        contract: contract.to_string(),
        value: U256::from_be_slice(&data[36..]),
    })
}

pub(crate) fn build(
    wallet: &WalletState,
    intent: &TransferIntent,
    key: VerifyingKey,
) -> Result<UnsignedTransaction> {
    let ChainReference::Evm {
        chain_id,
        gas_limit,
    } = wallet.reference
    else {
        return Err(Error::MissingReference("EVM chain id and gas limit"));
    };
    if gas_limit == 0 {
        return Err(Error::MissingReference("EVM gas limit"));
    }

    let to = parse_address(&intent.destination)?;
    ensure_funds(wallet, intent)?;

    let (to, value, input, outgoing) = match &intent.token {
        Some(contract) => (
            parse_address(contract)?,
            U256::ZERO,
            transfer_call(to, intent.amount),
            intent.fee,
        ),
        None => (to, intent.amount, Bytes::new(), intent.total()?),
    };

    let gas_price = u128::try_from(intent.fee / U256::from(gas_limit))
        .map_err(|_| Error::AmountOverflow)?;
    let tx = TxLegacy {
        chain_id: Some(chain_id),
        nonce: wallet.nonce,
        gas_price,
        gas_limit,
        to: TxKind::Call(to),
        value,
        input,
    };

    Ok(UnsignedTransaction {
        family: ChainFamily::Evm,
        digests: vec![tx.signature_hash().0],
        raw: None,
        public_key: key,
        outgoing,
        body: UnsignedBody::Evm(tx),
    })
}

pub(crate) fn assemble(
    unsigned: &UnsignedTransaction,
    tx: &TxLegacy,
    signatures: &[RawSignature],
) -> Result<SignedTransaction> {
    expect_count(signatures, 1)?;
    let (signature, recovery_id) = bind(&unsigned.public_key, &unsigned.digests[0], &signatures[0])?;

    let signature: alloy_primitives::Signature = (signature, recovery_id).into();
    let signed = tx.clone().into_signed(signature);
    let id = signed.hash().to_string();
    let raw = TxEnvelope::from(signed).encoded_2718();

    Ok(SignedTransaction {
        family: ChainFamily::Evm,
        payload: format!("0x{}", hex::encode(&raw)),
        debit: unsigned.debit(&id),
        raw,
        id,
    })
}
