use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

/// A supported distributed ledger.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum Blockchain {
    Ethereum,
    Near,
    Solana,
    Aptos,
}

impl Blockchain {
    /// Compare two addresses the way this chain defines address identity.
    ///
    /// EVM addresses are hex and compared case-insensitively (checksum casing
    /// is presentation only); every other chain compares exactly.
    pub fn addresses_match(&self, a: &str, b: &str) -> bool {
        match self {
            Blockchain::Ethereum => a.eq_ignore_ascii_case(b),
            Blockchain::Near | Blockchain::Solana | Blockchain::Aptos => a == b,
        }
    }
}

impl Display for Blockchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Blockchain::Ethereum => "Ethereum",
            Blockchain::Near => "Near",
            Blockchain::Solana => "Solana",
            Blockchain::Aptos => "Aptos",
        };
        write!(f, "{name}")
    }
}

/// A specific deployment of a [`Blockchain`].
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockchainNetwork {
    EthereumMainnet,
    EthereumSepolia,
    PolygonMainnet,
    PolygonAmoy,
    BaseMainnet,
    BaseSepolia,
    CeloMainnet,
    CeloAlfajores,
    NearMainnet,
    NearTestnet,
    SolanaMainnet,
    SolanaDevnet,
    SolanaTestnet,
    AptosMainnet,
    AptosTestnet,
}

impl BlockchainNetwork {
    pub const ALL: [BlockchainNetwork; 15] = [
        BlockchainNetwork::EthereumMainnet,
        BlockchainNetwork::EthereumSepolia,
        BlockchainNetwork::PolygonMainnet,
        BlockchainNetwork::PolygonAmoy,
        BlockchainNetwork::BaseMainnet,
        BlockchainNetwork::BaseSepolia,
        BlockchainNetwork::CeloMainnet,
        BlockchainNetwork::CeloAlfajores,
        BlockchainNetwork::NearMainnet,
        BlockchainNetwork::NearTestnet,
        BlockchainNetwork::SolanaMainnet,
        BlockchainNetwork::SolanaDevnet,
        BlockchainNetwork::SolanaTestnet,
        BlockchainNetwork::AptosMainnet,
        BlockchainNetwork::AptosTestnet,
    ];

    /// The protocol this network belongs to.
    pub fn blockchain(&self) -> Blockchain {
        match self {
            BlockchainNetwork::EthereumMainnet
            | BlockchainNetwork::EthereumSepolia
            | BlockchainNetwork::PolygonMainnet
            | BlockchainNetwork::PolygonAmoy
            | BlockchainNetwork::BaseMainnet
            | BlockchainNetwork::BaseSepolia
            | BlockchainNetwork::CeloMainnet
            | BlockchainNetwork::CeloAlfajores => Blockchain::Ethereum,
            BlockchainNetwork::NearMainnet | BlockchainNetwork::NearTestnet => Blockchain::Near,
            BlockchainNetwork::SolanaMainnet
            | BlockchainNetwork::SolanaDevnet
            | BlockchainNetwork::SolanaTestnet => Blockchain::Solana,
            BlockchainNetwork::AptosMainnet | BlockchainNetwork::AptosTestnet => Blockchain::Aptos,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BlockchainNetwork::EthereumMainnet => "EthereumMainnet",
            BlockchainNetwork::EthereumSepolia => "EthereumSepolia",
            BlockchainNetwork::PolygonMainnet => "PolygonMainnet",
            BlockchainNetwork::PolygonAmoy => "PolygonAmoy",
            BlockchainNetwork::BaseMainnet => "BaseMainnet",
            BlockchainNetwork::BaseSepolia => "BaseSepolia",
            BlockchainNetwork::CeloMainnet => "CeloMainnet",
            BlockchainNetwork::CeloAlfajores => "CeloAlfajores",
            BlockchainNetwork::NearMainnet => "NearMainnet",
            BlockchainNetwork::NearTestnet => "NearTestnet",
            BlockchainNetwork::SolanaMainnet => "SolanaMainnet",
            BlockchainNetwork::SolanaDevnet => "SolanaDevnet",
            BlockchainNetwork::SolanaTestnet => "SolanaTestnet",
            BlockchainNetwork::AptosMainnet => "AptosMainnet",
            BlockchainNetwork::AptosTestnet => "AptosTestnet",
        }
    }
}

impl Display for BlockchainNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("Unknown blockchain network: {0}")]
pub struct UnknownNetwork(pub String);

impl FromStr for BlockchainNetwork {
    type Err = UnknownNetwork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BlockchainNetwork::ALL
            .into_iter()
            .find(|n| n.name() == s)
            .ok_or_else(|| UnknownNetwork(s.to_string()))
    }
}

/// Identifies which protocol and network a wallet session belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainAndAddress {
    pub blockchain: Blockchain,
    pub blockchain_network: BlockchainNetwork,
    pub address: String,
}

impl ChainAndAddress {
    pub fn new(blockchain_network: BlockchainNetwork, address: impl Into<String>) -> Self {
        ChainAndAddress {
            blockchain: blockchain_network.blockchain(),
            blockchain_network,
            address: address.into(),
        }
    }

    /// Whether `other` denotes the same wallet on the same network.
    pub fn same_wallet(&self, other: &ChainAndAddress) -> bool {
        self.blockchain == other.blockchain
            && self.blockchain_network == other.blockchain_network
            && self.blockchain.addresses_match(&self.address, &other.address)
    }

    pub fn network_and_address(&self) -> NetworkAndAddress {
        NetworkAndAddress {
            blockchain_network: self.blockchain_network,
            address: self.address.clone(),
        }
    }
}

/// Subset of [`ChainAndAddress`] used for read-only checks; the chain is
/// inferred from the network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkAndAddress {
    pub blockchain_network: BlockchainNetwork,
    pub address: String,
}

impl NetworkAndAddress {
    pub fn new(blockchain_network: BlockchainNetwork, address: impl Into<String>) -> Self {
        NetworkAndAddress {
            blockchain_network,
            address: address.into(),
        }
    }

    pub fn blockchain(&self) -> Blockchain {
        self.blockchain_network.blockchain()
    }
}

impl From<ChainAndAddress> for NetworkAndAddress {
    fn from(value: ChainAndAddress) -> Self {
        NetworkAndAddress {
            blockchain_network: value.blockchain_network,
            address: value.address,
        }
    }
}
