pub mod login;
pub mod result;

pub use login::{LoginAttempt, LoginRecord};
pub use result::{Evaluation, RiskResult, Violation};
