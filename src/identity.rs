//! Per-device client identity.
//!
//! An [`Identity`] is constructed once (usually through [`IdentityStore`])
//! and passed explicitly to the lobby, arena, chat and presence services.
//! Nothing in the crate reads identity from ambient global state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{GalinheiroError, Result};
use crate::error_codes::ErrorCode;
use crate::protocol::{Avatar, ClientId};

/// Maximum display name length, in characters.
pub const MAX_DISPLAY_NAME_CHARS: usize = 20;

/// Lightweight editable profile shown to other players.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub display_name: String,
    #[serde(default)]
    pub avatar: Avatar,
}

impl Profile {
    /// Build a profile, validating the display name.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::InvalidDisplayName`] if the trimmed name is empty
    /// or longer than [`MAX_DISPLAY_NAME_CHARS`].
    pub fn new(display_name: &str, avatar: Avatar) -> Result<Self> {
        let display_name = display_name.trim();
        let len = display_name.chars().count();
        if len == 0 || len > MAX_DISPLAY_NAME_CHARS {
            return Err(GalinheiroError::rejected(ErrorCode::InvalidDisplayName));
        }
        Ok(Self {
            display_name: display_name.to_string(),
            avatar,
        })
    }

    fn placeholder(client_id: ClientId) -> Self {
        let short = client_id.simple().to_string();
        Self {
            display_name: format!("Galinha {}", short.get(..4).unwrap_or_default()),
            avatar: Avatar::default(),
        }
    }
}

/// The local player's identity: a stable device id, an optional
/// authenticated user id, and a profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub client_id: ClientId,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    pub profile: Profile,
}

impl Identity {
    /// Create an identity with a fresh random client id.
    pub fn generate(profile: Profile) -> Self {
        Self {
            client_id: Uuid::new_v4(),
            user_id: None,
            profile,
        }
    }

    /// Attach an authenticated user id.
    #[must_use]
    pub fn with_user_id(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn display_name(&self) -> &str {
        &self.profile.display_name
    }
}

/// JSON-file persistence for an [`Identity`].
///
/// The identity is generated on first use and reused thereafter, so a
/// device keeps its participant rows across restarts.
#[derive(Debug, Clone)]
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored identity, or create and persist a new one.
    ///
    /// # Errors
    ///
    /// Returns [`GalinheiroError::Io`] when the file cannot be read or
    /// written, and [`GalinheiroError::Serialization`] when it is corrupt.
    pub fn load_or_create(&self) -> Result<Identity> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => {
                let identity: Identity = serde_json::from_str(&text)?;
                debug!(client_id = %identity.client_id, "loaded stored identity");
                Ok(identity)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let client_id = Uuid::new_v4();
                let identity = Identity {
                    client_id,
                    user_id: None,
                    profile: Profile::placeholder(client_id),
                };
                self.save(&identity)?;
                info!(client_id = %client_id, "generated new device identity");
                Ok(identity)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Persist an identity (e.g. after a profile edit).
    ///
    /// # Errors
    ///
    /// Returns [`GalinheiroError::Io`] if the file cannot be written.
    pub fn save(&self, identity: &Identity) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(identity)?)?;
        Ok(())
    }
}
