//! Repository layer: one zero-sized struct per table.
//!
//! Every function takes any `PgExecutor`, so the same query runs against the
//! pool or inside a caller-owned transaction.

pub mod identity_repo;
pub mod otp_repo;
pub mod profile_repo;
pub mod session_repo;

pub use identity_repo::IdentityRepo;
pub use otp_repo::OtpRepo;
pub use profile_repo::ProfileRepo;
pub use session_repo::SessionRepo;
