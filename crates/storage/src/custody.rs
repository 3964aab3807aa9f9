// Refresh-token custody
//
// Wraps a ConnectionStore with the token cipher: tokens are sealed on write,
// opened on read, and rows still sealed under the previous key are written
// back under the current key the first time they are read.

use std::sync::Arc;

use autoads_core::ads::UserAdsConnection;
use autoads_core::{ConnectionStore, StoreError};
use chrono::Utc;
use thiserror::Error;

use crate::cipher::{CipherError, KeyUsed, TokenCipher};

#[derive(Debug, Error)]
pub enum CustodyError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cipher(#[from] CipherError),
}

#[derive(Clone)]
pub struct RefreshTokenVault {
    store: Arc<dyn ConnectionStore>,
    cipher: Arc<TokenCipher>,
}

impl RefreshTokenVault {
    pub fn new(store: Arc<dyn ConnectionStore>, cipher: Arc<TokenCipher>) -> Self {
        Self { store, cipher }
    }

    pub fn cipher(&self) -> &TokenCipher {
        &self.cipher
    }

    /// Seal the refresh token and upsert the connection
    pub async fn save(
        &self,
        user_id: &str,
        login_customer_id: Option<String>,
        primary_customer_id: Option<String>,
        refresh_token: &str,
    ) -> Result<(), CustodyError> {
        let sealed = self.cipher.encrypt(refresh_token)?;
        let connection = UserAdsConnection {
            user_id: user_id.to_string(),
            login_customer_id,
            primary_customer_id,
            refresh_token: sealed,
            updated_at: Utc::now(),
        };
        self.store.upsert_connection(&connection).await?;
        Ok(())
    }

    /// Connection with its refresh token opened
    pub async fn load(&self, user_id: &str) -> Result<Option<UserAdsConnection>, CustodyError> {
        let Some(mut connection) = self.store.get_connection(user_id).await? else {
            return Ok(None);
        };

        let opened = self.cipher.decrypt(&connection.refresh_token)?;
        if opened.needs_rewrite() {
            match self.cipher.encrypt(&opened.plaintext) {
                Ok(resealed) => {
                    if let Err(e) = self.store.update_refresh_token(user_id, &resealed).await {
                        tracing::warn!(user_id, "Failed to rewrite refresh token under current key: {}", e);
                    } else {
                        tracing::info!(user_id, "Rewrote refresh token under current key");
                    }
                }
                Err(e) => tracing::warn!(user_id, "Failed to reseal refresh token: {}", e),
            }
        }

        connection.refresh_token = opened.plaintext;
        Ok(Some(connection))
    }
}

/// Outcome of a migration pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub scanned: u64,
    /// Rows that do not open under the current key
    pub pending: u64,
    /// Rows rewritten (always 0 on a dry run)
    pub updated: u64,
    pub failed: u64,
}

/// Re-seal every connection whose token does not open under the current key.
///
/// Tokens sealed under the previous key are re-sealed; anything else that
/// fails to open is treated as a legacy plaintext token. Re-running after a
/// live pass reports zero pending rows.
pub async fn migrate_refresh_tokens(
    store: &dyn ConnectionStore,
    cipher: &TokenCipher,
    batch_size: i64,
    dry_run: bool,
) -> Result<MigrationReport, CustodyError> {
    if cipher.is_plaintext() {
        return Err(CustodyError::Cipher(CipherError::InvalidKey {
            name: "current",
            reason: "not configured".to_string(),
        }));
    }

    let batch_size = batch_size.max(1);
    let mut report = MigrationReport::default();
    let mut offset = 0i64;

    loop {
        let rows = store.list_connections(offset, batch_size).await?;
        if rows.is_empty() {
            break;
        }

        for row in &rows {
            report.scanned += 1;

            let plaintext = match cipher.decrypt(&row.refresh_token) {
                Ok(opened) if opened.key == KeyUsed::Current => continue,
                Ok(opened) => opened.plaintext,
                Err(_) => row.refresh_token.clone(),
            };
            report.pending += 1;

            if dry_run {
                tracing::info!(user_id = %row.user_id, "Would re-encrypt refresh token");
                continue;
            }

            let resealed = match cipher.encrypt(&plaintext) {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!(user_id = %row.user_id, "Failed to re-encrypt refresh token: {}", e);
                    report.failed += 1;
                    continue;
                }
            };
            match store.update_refresh_token(&row.user_id, &resealed).await {
                Ok(()) => {
                    report.updated += 1;
                    tracing::info!(user_id = %row.user_id, "Re-encrypted refresh token");
                }
                Err(e) => {
                    tracing::error!(user_id = %row.user_id, "Failed to update refresh token: {}", e);
                    report.failed += 1;
                }
            }
        }

        offset += batch_size;
    }

    Ok(report)
}
