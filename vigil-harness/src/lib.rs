//! Vigil Harness
//!
//! The job-process side of the Vigil health-reporting protocol. Every
//! scheduled job in the fleet runs unattended; the harness guarantees that
//! no matter how the job terminates, a truthful severity-ranked exit status
//! is produced and a durable run log exists for downstream tooling.
//!
//! Architecture:
//! - Configuration: job identity and limits from environment or defaults
//! - Run logger: append-only, file-backed record of one execution
//! - Exit managers: scoped execution with guaranteed finalization, in a
//!   synchronous and an asynchronous (cancellable) variant
//! - Retry: backoff helper for transient failures inside business logic
//!
//! A job constructs a [`logger::RunLogger`], enters an exit manager's scope,
//! and runs its business logic against the logger handle. On scope exit the
//! manager computes the final [`vigil_core::domain::severity::ExitStatus`],
//! which the entry point hands to the process as its exit code. The
//! supervisor records that code in the shared ledger via the `vigil-ledger`
//! binary.

pub mod config;
pub mod exit;
pub mod logger;
pub mod retry;
