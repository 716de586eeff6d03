pub mod identity;
pub mod otp;
pub mod session;
