//! Discord REST client.
//!
//! One client serves as both the [`GroupPlatform`] (roles) and the
//! [`Notifier`] (DMs and log-channel posts). It is cheap to clone.

use std::{collections::BTreeSet, fmt, sync::Arc};

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument, warn};
use url::Url;

use super::GroupPlatform;
use crate::{
    config::{PlatformConfig, SyncConfig},
    error::{Result, SyncError},
    ids::{ChannelId, GuildId, RoleId, UserId},
    notify::{Notice, Notifier, NotifyTarget},
};

const AUDIT_REASON_HEADER: &str = "X-Audit-Log-Reason";
const MAX_AUDIT_REASON: usize = 512;

#[derive(Debug, Deserialize)]
struct ApiRole {
    id: RoleId,
}

#[derive(Debug, Deserialize)]
struct ApiMember {
    #[serde(default)]
    roles: Vec<RoleId>,
}

#[derive(Debug, Deserialize)]
struct ApiChannel {
    id: ChannelId,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

struct Inner {
    http: Client,
    base_url: String,
    token: String,
    guild: GuildId,
    log_channel: Option<ChannelId>,
    embed_color: u32,
}

impl fmt::Debug for Inner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordClient")
            .field("base_url", &self.base_url)
            .field("guild", &self.guild)
            .field("log_channel", &self.log_channel)
            .finish_non_exhaustive()
    }
}

/// Discord client bound to one guild.
///
/// # Examples
///
/// ```rust,no_run
/// use membership_sync::{config::SyncConfig, platform::{DiscordClient, GroupPlatform}};
///
/// # async fn example(config: SyncConfig) -> membership_sync::error::Result<()> {
/// let discord = DiscordClient::from_config(&config)?;
/// let roles = discord.server_roles().await?;
/// println!("{} roles on {}", roles.len(), discord.guild_id());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DiscordClient {
    inner: Arc<Inner>,
}

impl DiscordClient {
    /// Creates a client from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if the guild id is missing or the base URL
    /// is not allowed, or [`SyncError::Http`] if the HTTP client cannot be
    /// built.
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let guild = config
            .guild_id
            .clone()
            .ok_or_else(|| SyncError::Config("guild_id is required".to_owned()))?;
        let base_url = config.parse_base_url("platform.base_url", &config.platform.base_url)?;
        Self::new(&config.platform, guild, &base_url)
    }

    /// Creates a client against an explicit base URL.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &PlatformConfig, guild: GuildId, base_url: &Url) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.timeout().min(std::time::Duration::from_secs(10)))
            .build()?;
        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base_url: base_url.as_str().trim_end_matches('/').to_owned(),
                token: config.bot_token.clone(),
                guild,
                log_channel: config.log_channel_id.clone(),
                embed_color: config.embed_color,
            }),
        })
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = Url::parse(&format!("{}{path}", self.inner.base_url))
            .map_err(|e| SyncError::Platform(format!("invalid platform path {path}: {e}")))?;
        Ok(self
            .inner
            .http
            .request(method, url)
            .header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.inner.token)))
    }

    fn member_role_path(&self, user: &UserId, role: &RoleId) -> String {
        format!("/guilds/{}/members/{user}/roles/{role}", self.inner.guild)
    }

    async fn mutate_role(
        &self,
        method: Method,
        user: &UserId,
        role: &RoleId,
        reason: &str,
    ) -> Result<()> {
        let response = self
            .request(method, &self.member_role_path(user, role))?
            .header(AUDIT_REASON_HEADER, audit_reason(reason))
            .send()
            .await?;
        if response.status().is_success() {
            return Ok(());
        }
        Err(SyncError::RoleMutation {
            user_id: user.to_string(),
            role_id: role.to_string(),
            message: error_message(response).await,
        })
    }

    async fn open_dm(&self, user: &UserId) -> Result<ChannelId> {
        let response = self
            .request(Method::POST, "/users/@me/channels")?
            .json(&json!({ "recipient_id": user }))
            .send()
            .await?;
        let channel: ApiChannel = expect_json(response).await?;
        Ok(channel.id)
    }

    async fn post_message(&self, channel: &ChannelId, notice: &Notice) -> Result<()> {
        let payload = match notice.title() {
            Some(title) => json!({
                "embeds": [{
                    "title": title,
                    "description": notice.body(),
                    "color": self.inner.embed_color,
                }]
            }),
            None => json!({ "content": notice.body() }),
        };
        let response = self
            .request(Method::POST, &format!("/channels/{channel}/messages"))?
            .json(&payload)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(SyncError::Platform(error_message(response).await))
        }
    }

    async fn deliver(&self, target: &NotifyTarget, notice: &Notice) -> Result<()> {
        match target {
            NotifyTarget::User(user) => {
                let channel = self.open_dm(user).await?;
                self.post_message(&channel, notice).await
            }
            NotifyTarget::LogChannel => match &self.inner.log_channel {
                Some(channel) => self.post_message(channel, notice).await,
                None => Ok(()),
            },
        }
    }
}

/// Encodes a reason for the audit-log header: control characters are
/// dropped, non-ASCII bytes are percent-encoded, length is capped without
/// splitting an encoded character.
fn audit_reason(reason: &str) -> String {
    let mut encoded = String::with_capacity(reason.len().min(MAX_AUDIT_REASON));
    for ch in reason.chars().filter(|ch| !ch.is_control()) {
        let mut buf = [0u8; 4];
        let piece: String = ch
            .encode_utf8(&mut buf)
            .bytes()
            .map(|byte| {
                if byte.is_ascii() && byte != b'%' {
                    char::from(byte).to_string()
                } else {
                    format!("%{byte:02X}")
                }
            })
            .collect();
        if encoded.len() + piece.len() > MAX_AUDIT_REASON {
            break;
        }
        encoded.push_str(&piece);
    }
    encoded
}

async fn error_message(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    serde_json::from_str::<ApiError>(&body)
        .map(|error| error.message)
        .unwrap_or_else(|_| status.canonical_reason().unwrap_or("request failed").to_owned())
}

async fn expect_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        return Err(SyncError::Platform(format!("{status}: {}", error_message(response).await)));
    }
    let body = response.text().await?;
    serde_json::from_str(&body)
        .map_err(|e| SyncError::Platform(format!("unexpected response body: {e}")))
}

impl GroupPlatform for DiscordClient {
    fn guild_id(&self) -> &GuildId {
        &self.inner.guild
    }

    #[instrument(skip(self), level = "debug")]
    async fn server_roles(&self) -> Result<Vec<RoleId>> {
        let response =
            self.request(Method::GET, &format!("/guilds/{}/roles", self.inner.guild))?.send().await?;
        let roles: Vec<ApiRole> = expect_json(response).await?;
        Ok(roles.into_iter().map(|role| role.id).collect())
    }

    #[instrument(skip(self, user), fields(user = %user), level = "debug")]
    async fn member_roles<'a>(&'a self, user: &'a UserId) -> Result<Option<BTreeSet<RoleId>>> {
        let response = self
            .request(Method::GET, &format!("/guilds/{}/members/{user}", self.inner.guild))?
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("User is not a member of the guild");
            return Ok(None);
        }
        let member: ApiMember = expect_json(response).await?;
        Ok(Some(member.roles.into_iter().collect()))
    }

    #[instrument(skip(self, user, role), fields(user = %user, role = %role), level = "debug")]
    async fn add_role<'a>(&'a self, user: &'a UserId, role: &'a RoleId, reason: &'a str) -> Result<()> {
        self.mutate_role(Method::PUT, user, role, reason).await
    }

    #[instrument(skip(self, user, role), fields(user = %user, role = %role), level = "debug")]
    async fn remove_role<'a>(
        &'a self,
        user: &'a UserId,
        role: &'a RoleId,
        reason: &'a str,
    ) -> Result<()> {
        self.mutate_role(Method::DELETE, user, role, reason).await
    }
}

impl Notifier for DiscordClient {
    async fn notify<'a>(&'a self, target: NotifyTarget, notice: &'a Notice) {
        if let Err(e) = self.deliver(&target, notice).await {
            match target {
                NotifyTarget::User(user) => debug!(user = %user, error = %e, "Direct message not delivered"),
                NotifyTarget::LogChannel => warn!(error = %e, "Log channel post failed"),
            }
        }
    }
}
