//! Strongly-typed identifiers for marketplace entities.
//!
//! Each kind of record gets its own newtype around a UUID so that a bid id
//! cannot be handed to a function expecting a crop id.

macro_rules! new_id {
    ($struct:ident, $doc:literal) => {
        #[doc = $doc]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde", serde(transparent))]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $struct(pub uuid::Uuid);

        impl $struct {
            /// Generate a fresh random identifier
            pub fn random() -> Self {
                Self(uuid::Uuid::new_v4())
            }
        }

        impl From<uuid::Uuid> for $struct {
            fn from(value: uuid::Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$struct> for uuid::Uuid {
            fn from(value: $struct) -> Self {
                value.0
            }
        }

        impl std::fmt::Display for $struct {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::str::FromStr for $struct {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }
    };
}

new_id!(UserId, "Unique identifier for a farmer, retailer or operator");
new_id!(CropId, "Unique identifier for a single farmer's crop lot");
new_id!(PoolId, "Unique identifier for a pool of undersized crop lots");
new_id!(BidId, "Unique identifier for a retailer's bid");
new_id!(
    TransactionId,
    "Unique identifier for the settlement record of an accepted bid"
);
new_id!(DisputeId, "Unique identifier for a dispute against a transaction");
new_id!(EntryId, "Unique identifier for a wallet ledger entry");

/// Anything that can be auctioned: a standalone crop or a pool of crops.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", content = "id", rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LotId {
    /// A single crop lot
    Crop(CropId),
    /// A pooled lot
    Pool(PoolId),
}

impl LotId {
    /// The storage discriminator for this kind of lot
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Crop(_) => "crop",
            Self::Pool(_) => "pool",
        }
    }

    /// The underlying uuid, regardless of kind
    pub fn uuid(&self) -> uuid::Uuid {
        match self {
            Self::Crop(id) => id.0,
            Self::Pool(id) => id.0,
        }
    }

    /// Rebuild a lot id from its storage discriminator and uuid
    pub fn from_parts(kind: &str, id: uuid::Uuid) -> Option<Self> {
        match kind {
            "crop" => Some(Self::Crop(id.into())),
            "pool" => Some(Self::Pool(id.into())),
            _ => None,
        }
    }
}

impl From<CropId> for LotId {
    fn from(value: CropId) -> Self {
        Self::Crop(value)
    }
}

impl From<PoolId> for LotId {
    fn from(value: PoolId) -> Self {
        Self::Pool(value)
    }
}

impl std::fmt::Display for LotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind(), self.uuid())
    }
}
