//! appshots Common Library
//!
//! CLIとWeb(WASM)で共有するアップロードウィザードの中核

pub mod backend;
pub mod codec;
pub mod error;
pub mod flow;
pub mod gate;
pub mod lifecycle;
pub mod link;
pub mod persistence;
pub mod session;
pub mod submit;
pub mod types;
pub mod wizard;

pub use backend::{CachedResolver, MetadataResolver, ObjectStore, RecordStore, ScreenshotRecord};
pub use codec::{DataUrlCodec, Payload, PayloadCodec};
pub use error::{Error, Result};
pub use flow::{FlowConfig, UploadFlow, DEFAULT_UPLOAD_ROUTE};
pub use gate::{AccessGate, AccessLevel, GateDecision, RedirectTarget, Resolution, Viewer};
pub use lifecycle::{Due, LifecycleConfig, LifecycleGuard, Phase, Visibility, VisibilityAction};
pub use link::{parse_store_link, Store, StoreLink};
pub use persistence::{Persistence, SaveOutcome, Snapshot};
pub use session::{FlowSession, MemoryStore, SessionStore};
pub use submit::SubmitReport;
pub use types::{
    AppRecord, CategoryRef, ElementRef, FlowVariant, HeroSelection, PendingScreenshot, Platform,
    RawFile, TagSubStep, SCREEN_CATEGORIES,
};
pub use wizard::{BatchOutcome, TagOutcome, Wizard, WizardState};
