//! Entity code generation: collision-resistant, checksummed, human-typeable
//! identifiers minted per process without central coordination.

pub mod generator;
pub mod worker_id;

pub use generator::{CodeError, CodeGenerator, ParsedCode, CODE_ALPHABET};
pub use worker_id::{FixedWorkerId, HashedHostWorkerId, WorkerIdSource};
