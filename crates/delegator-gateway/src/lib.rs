//! JSON-RPC to a chain node and a bundler; constructs and issues ERC-4337
//! calls (design §4.4). Carries no durable state -- the Coordinator owns
//! `chainConfig`/`bundlerConfig` and replays them through `configure`.

pub mod gateway;
pub mod rpc;

pub use gateway::{ChainGateway, GasEstimate, GasFees};
pub use rpc::RpcEndpoint;
