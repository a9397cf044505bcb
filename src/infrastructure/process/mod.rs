pub mod supervisor;

pub use supervisor::TokioProcessSupervisor;
