pub mod battery;
pub mod lis3dh;
pub mod rgb;
