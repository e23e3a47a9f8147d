pub mod collection;
pub mod events;
pub mod gacha;
pub mod info;
pub mod inventory;
pub mod items;
pub mod machine_config;
pub mod model;
pub mod payouts;
pub mod pipeline;
pub mod progress;
pub mod registry;
pub mod session;
pub mod submodel;
pub mod sync;

pub use gacha::Gacha;
pub use registry::{
    Registry,
    SubmodelDescriptor,
};
pub use session::Session;
pub use submodel::SubmodelKind;
pub use sync::{
    ReqwestTransport,
    SyncAdapter,
    SyncError,
    SyncIntent,
    SyncOptions,
};
