//! # Contract ABI
//!
//! Loads a Truffle-style contract artifact and encodes/decodes the calls the
//! engine makes. Only the types the charity contract uses are supported:
//! `uint*`, `address`, `bool` and `string`.
//!
//! ```text
//! calldata = selector(4) || head words || tail (dynamic values)
//! selector = keccak256("name(type,type)")[..4]
//! ```

use std::collections::HashMap;
use std::path::Path;

use primitive_types::U256;
use serde::Deserialize;
use sha3::{Digest, Keccak256};
use thiserror::Error;

use crate::domain::NetworkId;

const WORD: usize = 32;

/// ABI and artifact errors.
#[derive(Debug, Error)]
pub enum AbiError {
    /// Descriptor file could not be read.
    #[error("Failed to read contract descriptor: {0}")]
    Io(#[from] std::io::Error),

    /// Descriptor is not a valid artifact.
    #[error("Malformed contract descriptor: {0}")]
    Json(#[from] serde_json::Error),

    /// Artifact has no address for the network.
    #[error("Contract not deployed on network {0}")]
    NotDeployed(NetworkId),

    /// No function with this name in the ABI.
    #[error("Unknown contract function: {0}")]
    UnknownFunction(String),

    /// Wrong number of call arguments.
    #[error("{function} takes {expected} arguments, got {got}")]
    Arity {
        /// Function being encoded
        function: String,
        /// Declared input count
        expected: usize,
        /// Arguments supplied
        got: usize,
    },

    /// ABI type this codec does not handle.
    #[error("Unsupported ABI type: {0}")]
    Unsupported(String),

    /// Argument token does not fit the declared type.
    #[error("Argument for {param} is not a {ty}")]
    TypeMismatch {
        /// Parameter name
        param: String,
        /// Declared ABI type
        ty: String,
    },

    /// Return data ended early.
    #[error("Return data truncated at byte {0}")]
    Truncated(usize),

    /// Returned `string` bytes are not UTF-8.
    #[error("Return string is not UTF-8")]
    InvalidUtf8,
}

/// One decoded ABI value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    /// Any `uint*`.
    Uint(U256),
    /// `0x`-prefixed lowercase hex.
    Address(String),
    /// `bool`.
    Bool(bool),
    /// `string`.
    String(String),
}

impl Token {
    /// The value of a `Uint` token.
    pub fn as_uint(&self) -> Option<U256> {
        match self {
            Token::Uint(v) => Some(*v),
            _ => None,
        }
    }

    /// The text of a `String` or `Address` token.
    pub fn into_string(self) -> Option<String> {
        match self {
            Token::String(s) | Token::Address(s) => Some(s),
            _ => None,
        }
    }
}

/// One input or output of an ABI entry.
#[derive(Clone, Debug, Deserialize)]
pub struct AbiParam {
    /// Parameter name; empty for unnamed outputs.
    #[serde(default)]
    pub name: String,
    /// Solidity type, e.g. `uint256`.
    #[serde(rename = "type")]
    pub ty: String,
}

/// One ABI entry.
#[derive(Clone, Debug, Deserialize)]
pub struct AbiFunction {
    /// Function name.
    #[serde(default)]
    pub name: String,
    /// Entry type; only `function` entries are kept.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Declared inputs.
    #[serde(default)]
    pub inputs: Vec<AbiParam>,
    /// Declared outputs.
    #[serde(default)]
    pub outputs: Vec<AbiParam>,
}

impl AbiFunction {
    /// Canonical signature, e.g. `donateToCharity(uint256)`.
    pub fn signature(&self) -> String {
        let types: Vec<&str> = self.inputs.iter().map(|p| p.ty.as_str()).collect();
        format!("{}({})", self.name, types.join(","))
    }

    /// First four bytes of the Keccak-256 of the signature.
    pub fn selector(&self) -> [u8; 4] {
        selector(&self.signature())
    }

    /// Calldata for a call with `args`.
    pub fn encode_call(&self, args: &[Token]) -> Result<Vec<u8>, AbiError> {
        if args.len() != self.inputs.len() {
            return Err(AbiError::Arity {
                function: self.name.clone(),
                expected: self.inputs.len(),
                got: args.len(),
            });
        }

        let mut head = Vec::with_capacity(args.len() * WORD);
        let mut tail = Vec::new();
        for (param, arg) in self.inputs.iter().zip(args) {
            match (param.ty.as_str(), arg) {
                (ty, Token::Uint(v)) if ty.starts_with("uint") => head.extend(uint_word(*v)),
                ("bool", Token::Bool(b)) => head.extend(uint_word(U256::from(u8::from(*b)))),
                ("address", Token::Address(a)) => head.extend(address_word(a)?),
                ("string", Token::String(s)) => {
                    let offset = self.inputs.len() * WORD + tail.len();
                    head.extend(uint_word(U256::from(offset)));
                    tail.extend(uint_word(U256::from(s.len())));
                    tail.extend(padded(s.as_bytes()));
                }
                (ty, _) if is_supported(ty) => {
                    return Err(AbiError::TypeMismatch {
                        param: param.name.clone(),
                        ty: ty.to_string(),
                    })
                }
                (ty, _) => return Err(AbiError::Unsupported(ty.to_string())),
            }
        }

        let mut data = self.selector().to_vec();
        data.extend(head);
        data.extend(tail);
        Ok(data)
    }

    /// Decode return data into `(output name, value)` pairs, in ABI order.
    pub fn decode_output(&self, data: &[u8]) -> Result<Vec<(String, Token)>, AbiError> {
        self.outputs
            .iter()
            .enumerate()
            .map(|(i, param)| {
                let word = read_word(data, i * WORD)?;
                let token = match param.ty.as_str() {
                    ty if ty.starts_with("uint") => Token::Uint(U256::from_big_endian(word)),
                    "bool" => Token::Bool(word.iter().any(|b| *b != 0)),
                    "address" => Token::Address(format!("0x{}", hex::encode(&word[12..]))),
                    "string" => Token::String(read_string(data, word)?),
                    ty => return Err(AbiError::Unsupported(ty.to_string())),
                };
                Ok((param.name.clone(), token))
            })
            .collect()
    }
}

fn is_supported(ty: &str) -> bool {
    ty.starts_with("uint") || matches!(ty, "bool" | "address" | "string")
}

/// First four bytes of the Keccak-256 of `signature`.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash[..4]);
    out
}

fn uint_word(value: U256) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    value.to_big_endian(&mut word);
    word
}

fn address_word(address: &str) -> Result<[u8; WORD], AbiError> {
    let mismatch = || AbiError::TypeMismatch {
        param: address.to_string(),
        ty: "address".to_string(),
    };
    let bytes = hex::decode(address.trim_start_matches("0x")).map_err(|_| mismatch())?;
    if bytes.len() != 20 {
        return Err(mismatch());
    }
    let mut word = [0u8; WORD];
    word[12..].copy_from_slice(&bytes);
    Ok(word)
}

fn padded(bytes: &[u8]) -> Vec<u8> {
    let mut out = bytes.to_vec();
    let rem = out.len() % WORD;
    if rem != 0 {
        out.resize(out.len() + WORD - rem, 0);
    }
    out
}

fn read_word(data: &[u8], at: usize) -> Result<&[u8], AbiError> {
    let end = at.checked_add(WORD).ok_or(AbiError::Truncated(at))?;
    data.get(at..end).ok_or(AbiError::Truncated(at))
}

fn read_usize(word: &[u8], at: usize) -> Result<usize, AbiError> {
    let value = U256::from_big_endian(word);
    if value > U256::from(usize::MAX) {
        return Err(AbiError::Truncated(at));
    }
    Ok(value.as_usize())
}

fn read_string(data: &[u8], offset_word: &[u8]) -> Result<String, AbiError> {
    let offset = read_usize(offset_word, 0)?;
    let len = read_usize(read_word(data, offset)?, offset)?;
    let start = offset + WORD;
    let bytes = data
        .get(start..start.saturating_add(len))
        .ok_or(AbiError::Truncated(start))?;
    String::from_utf8(bytes.to_vec()).map_err(|_| AbiError::InvalidUtf8)
}

#[derive(Debug, Deserialize)]
struct Artifact {
    abi: Vec<AbiFunction>,
    #[serde(default)]
    networks: HashMap<String, Deployment>,
}

#[derive(Debug, Deserialize)]
struct Deployment {
    address: String,
}

/// Callable functions plus the contract address on each network it is deployed to.
#[derive(Clone, Debug)]
pub struct ContractDescriptor {
    deployments: HashMap<String, String>,
    functions: HashMap<String, AbiFunction>,
}

impl ContractDescriptor {
    /// Load a Truffle artifact (`abi` + `networks.<id>.address`).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AbiError> {
        let json = std::fs::read_to_string(path)?;
        Self::parse(&json)
    }

    /// Parse an artifact from JSON text.
    pub fn parse(json: &str) -> Result<Self, AbiError> {
        let artifact: Artifact = serde_json::from_str(json)?;
        let deployments = artifact
            .networks
            .into_iter()
            .map(|(network, deployment)| (network, deployment.address))
            .collect();
        let functions = artifact
            .abi
            .into_iter()
            .filter(|f| f.kind == "function")
            .map(|f| (f.name.clone(), f))
            .collect();

        Ok(Self {
            deployments,
            functions,
        })
    }

    /// Contract address on `network`.
    pub fn address(&self, network: NetworkId) -> Result<&str, AbiError> {
        self.deployments
            .get(&network.0.to_string())
            .map(String::as_str)
            .ok_or(AbiError::NotDeployed(network))
    }

    /// Look up a function by name.
    pub fn function(&self, name: &str) -> Result<&AbiFunction, AbiError> {
        self.functions
            .get(name)
            .ok_or_else(|| AbiError::UnknownFunction(name.to_string()))
    }
}
