//! # Socialink
//!
//! Social login and account linking. A user signs in with an external OAuth2 provider and the
//! returned profile is reconciled with the local accounts: an existing link logs the user in, a
//! matching email links the identity to that account, and an unknown profile registers a new
//! account when the site allows it.
//!
//! Enable the pieces you need with cargo features:
//!
//! - `flow`: the redirect/callback engine ([`flow`])
//! - `session`: browser sessions and the in-memory store ([`session`])
//! - `store`: in-memory account and link storage, `sqlite`/`postgres` for SQL links ([`store`])
//! - `axum`: routes and extractors ([`axum`])
//! - `google`: the Google provider ([`providers::google`])
//!
//! ```rust,ignore
//! use socialink::flow::{FlowContext, OAuth2Flow, ProviderSettings, Socialink};
//! use socialink::providers::google::GoogleProvider;
//! use socialink::store::{MemoryLinkStore, MemoryUserStore};
//! use std::sync::Arc;
//!
//! let ctx = FlowContext::new(
//!     Arc::new(MemoryUserStore::default()),
//!     Arc::new(MemoryLinkStore::default()),
//! );
//! let google = GoogleProvider::new(client_id, client_secret, redirect_uri);
//! let socialink = Socialink::builder()
//!     .provider(OAuth2Flow::new(google, ProviderSettings::from_env("google"), ctx))
//!     .session_store(Arc::new(socialink::session::MemoryStore::default()))
//!     .build();
//! ```

pub use socialink_core::*;

#[cfg(feature = "flow")]
pub mod flow {
    pub use socialink_flow::*;
}

#[cfg(feature = "session")]
pub mod session {
    pub use socialink_session::*;
}

#[cfg(feature = "store")]
pub mod store {
    pub use socialink_store::*;
}

#[cfg(feature = "axum")]
pub mod axum {
    pub use socialink_axum::*;
}

pub mod providers {
    #[cfg(feature = "google")]
    pub mod google {
        pub use socialink_providers_google::*;
    }
}
