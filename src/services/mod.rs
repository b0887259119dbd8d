pub mod compression;
pub mod delivery;
pub mod fetch;
pub mod ledger;
pub mod pipeline;
pub mod queue;
pub mod storage;
pub mod store;
pub mod worker;
