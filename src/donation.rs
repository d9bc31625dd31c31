//! Donation profiles: a searchable list of recipients and a one-step donate flow.

use crate::batch::{BatchTransfer, TransferError};
use crate::ens::NameResolver;
use crate::wallet::{LedgerClient, TxReceipt};

use serde::{Deserialize, Serialize};
use tracing::info;

/// A donation recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub address: String,
    pub ens: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub role: String,
}

/// Profiles whose name or ENS name contains `query` as typed, ignoring case.
/// An empty query keeps every profile.
pub fn filter_profiles<'a>(profiles: &'a [Profile], query: &str) -> Vec<&'a Profile> {
    let query = query.to_lowercase();
    profiles
        .iter()
        .filter(|p| {
            p.name.to_lowercase().contains(&query) || p.ens.to_lowercase().contains(&query)
        })
        .collect()
}

pub fn find_profile<'a>(profiles: &'a [Profile], id: &str) -> Option<&'a Profile> {
    profiles.iter().find(|p| p.id == id)
}

/// Send `amount` ether to the profile's address and wait for it to be mined
pub async fn donate<L: LedgerClient, R: NameResolver>(
    transfers: &BatchTransfer<L, R>,
    profile: &Profile,
    amount: &str,
) -> Result<TxReceipt, TransferError> {
    let receipt = transfers.send_native(&profile.address, amount).await?;
    info!(profile = %profile.id, hash = %receipt.hash, "donation confirmed");
    Ok(receipt)
}
