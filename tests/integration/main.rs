//! Integration tests: the decision engine driven end-to-end through its
//! public API with in-memory collaborators.

mod mock_provider;
mod pipeline;
mod simulation;
