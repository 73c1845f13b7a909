pub mod qrcode;
pub mod scan;
pub mod user;

pub use qrcode::{CreateQrRequest, NewQrCode, QrCode, UpdateQrRequest};
pub use scan::{NewScanEvent, ScanEvent};
pub use user::{LoginForm, RegisterRequest, TokenResponse, User};
