pub mod timing;

pub use timing::AuthTimer;
