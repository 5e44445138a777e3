mod init;
mod run;
mod scan;

pub use init::cmd_init;
pub use run::cmd_run;
pub use scan::cmd_scan;
