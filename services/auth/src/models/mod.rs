//! Authentication service models

pub mod session;
pub mod token;
pub mod user;

pub use session::{IssuedSession, Session, SessionMeta};
pub use token::{
    PasswordResetToken, PurgeReport, ResetRedemption, TrustedDevice, TwoFactorChallenge, VerificationToken,
};
pub use user::{NewUser, User, UserView};
