//! Relays content from independent web pages to social-network accounts:
//! given a page URL and a `.../publish/<silo>` target, resolves the owning
//! account, interprets the page's microformats, expands references to
//! previously syndicated copies, enforces one-publish-per-page-per-account,
//! and dispatches creation to the silo's adapter.

pub mod content;
pub mod error;
pub mod fetch;
pub mod ledger;
pub mod mf2;
pub mod notify;
pub mod publish;
pub mod registry;
pub mod resolver;
pub mod silo;
pub mod storage;
pub mod syndication;
pub mod testutil;
pub mod types;

pub use error::PublishError;
pub use publish::Publisher;
pub use registry::SiloRegistry;
pub use types::{
    Account, AccountId, AccountStatus, AttemptId, AttemptStatus, Creation, Feature, PageId,
    PublishAttempt, PublishKind, PublishMode, PublishOutcome, PublishRequest, PublishedPage,
    RsvpValue, SyndicationLink,
};
