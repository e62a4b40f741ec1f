//! Messages exchanged between peerlink nodes.
//!
//! Every message implements [`WireType`] so it can be framed by
//! `peerlink_protocol` and dispatched by its type name.

pub mod directory;
pub mod health;
pub mod node_info;
pub mod relay;

use peerlink_protocol::{MessageRegistry, WireType};

pub use directory::{ConnectNodeReq, RegisterNodeAck, RegisterNodeReq, SyncNodeAck, SyncNodeReq};
pub use health::{
    EchoAck, EchoReq, NodeHeightChangedReq, PingReq, PongReq, UpdateFeeReq, UpdatePackageFeeReq,
};
pub use node_info::NodeInfo;
pub use relay::{BroadcastMsgReq, TransMsgReq};

macro_rules! wire_types {
    ($($ty:ident),* $(,)?) => {
        $(
            impl WireType for $ty {
                const TYPE_NAME: &'static str = stringify!($ty);
            }
        )*

        /// Type names of every message in this crate.
        pub const ALL_TYPE_NAMES: &[&str] = &[$(stringify!($ty)),*];

        /// Register a decoder for every message in this crate.
        pub fn register_all(registry: &mut MessageRegistry) {
            $( registry.register::<$ty>(); )*
        }
    };
}

wire_types!(
    RegisterNodeReq,
    RegisterNodeAck,
    SyncNodeReq,
    SyncNodeAck,
    ConnectNodeReq,
    TransMsgReq,
    BroadcastMsgReq,
    PingReq,
    PongReq,
    EchoReq,
    EchoAck,
    UpdateFeeReq,
    UpdatePackageFeeReq,
    NodeHeightChangedReq,
);
