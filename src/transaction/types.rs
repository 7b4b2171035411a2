//! Transaction envelope types: messages, body, auth info and signatures
use crate::coins::Coins;
use crate::crypto::{Address, PubKey};
use crate::error::HarnessError;
use crate::transaction::sign_mode::SignMode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Maximum encoded transaction size in bytes
pub const MAX_TRANSACTION_SIZE: usize = 100_000;

/// Send coins from one account to another.
///
/// Fields are declared in key order so JSON sign bytes stay canonical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSend {
    pub amount: Coins,
    #[serde(with = "hex")]
    pub from_address: Address,
    #[serde(with = "hex")]
    pub to_address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    #[serde(with = "hex")]
    pub address: Address,
    pub coins: Coins,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    #[serde(with = "hex")]
    pub address: Address,
    pub coins: Coins,
}

/// Many-to-many send; every input address must sign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgMultiSend {
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
}

/// The closed set of messages the reference application routes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Msg {
    Send(MsgSend),
    MultiSend(MsgMultiSend),
}

impl Msg {
    pub fn send(from: Address, to: Address, amount: Coins) -> Self {
        Msg::Send(MsgSend {
            amount,
            from_address: from,
            to_address: to,
        })
    }

    /// Addresses that must sign this message, in order.
    pub fn signers(&self) -> Vec<Address> {
        match self {
            Msg::Send(msg) => vec![msg.from_address],
            Msg::MultiSend(msg) => msg.inputs.iter().map(|i| i.address).collect(),
        }
    }

    pub fn type_url(&self) -> &'static str {
        match self {
            Msg::Send(_) => "/bank.v1.MsgSend",
            Msg::MultiSend(_) => "/bank.v1.MsgMultiSend",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxBody {
    pub messages: Vec<Msg>,
    pub memo: String,
    pub timeout_height: u64,
}

/// One signature slot: who signs, how, and at which sequence. The signature
/// bytes themselves live in [`Tx::signatures`] at the same index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerInfo {
    pub public_key: PubKey,
    pub mode: SignMode,
    pub sequence: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    pub amount: Coins,
    pub gas_limit: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthInfo {
    pub signer_infos: Vec<SignerInfo>,
    pub fee: Fee,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tx {
    pub body: TxBody,
    pub auth_info: AuthInfo,
    pub signatures: Vec<Vec<u8>>,
}

impl Tx {
    pub fn body_bytes(&self) -> Result<Vec<u8>, HarnessError> {
        Ok(bincode::serialize(&self.body)?)
    }

    pub fn auth_info_bytes(&self) -> Result<Vec<u8>, HarnessError> {
        Ok(bincode::serialize(&self.auth_info)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, HarnessError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn hash(&self) -> Result<[u8; 32], HarnessError> {
        Ok(Sha256::digest(self.to_bytes()?).into())
    }

    pub fn hash_str(&self) -> Result<String, HarnessError> {
        Ok(hex::encode(self.hash()?))
    }

    /// Required signers: message signers in order of first appearance,
    /// without duplicates.
    pub fn signers(&self) -> Vec<Address> {
        let mut signers: Vec<Address> = Vec::new();
        for msg in &self.body.messages {
            for signer in msg.signers() {
                if !signers.contains(&signer) {
                    signers.push(signer);
                }
            }
        }
        signers
    }

    pub fn fee_payer(&self) -> Option<Address> {
        self.signers().first().copied()
    }

    pub fn gas_limit(&self) -> u64 {
        self.auth_info.fee.gas_limit
    }

    pub fn memo(&self) -> &str {
        &self.body.memo
    }
}

/// Signature data for a single key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleSignatureData {
    pub mode: SignMode,
    pub signature: Vec<u8>,
}

/// A signature together with the context it was produced for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureV2 {
    pub pub_key: PubKey,
    pub data: SingleSignatureData,
    pub sequence: u64,
}

impl SignatureV2 {
    /// An unsigned slot: key, mode and sequence set, signature empty.
    pub fn empty(pub_key: PubKey, mode: SignMode, sequence: u64) -> Self {
        SignatureV2 {
            pub_key,
            data: SingleSignatureData {
                mode,
                signature: Vec::new(),
            },
            sequence,
        }
    }
}

/// Per-signer context mixed into the sign bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerData {
    pub chain_id: String,
    pub account_number: u64,
    pub sequence: u64,
}
