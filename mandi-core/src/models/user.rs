use super::{UserId, text_enum};

/// What a user does on the marketplace.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Lists crops
    Farmer,
    /// Bids on lots
    Retailer,
    /// Reviews disputes and runs the marketplace
    Operator,
}

text_enum!(Role {
    Farmer => "farmer",
    Retailer => "retailer",
    Operator => "operator",
});

/// A read-only identity record owned by the identity store.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    /// The user's id
    pub id: UserId,
    /// Display name
    pub name: String,
    /// Marketplace role
    pub role: Role,
}
