pub mod arm;
pub mod build;
pub mod cleanup;
pub mod disk;
pub mod dispatch;
pub mod init;
pub mod list;
pub mod status;
pub mod verify;
