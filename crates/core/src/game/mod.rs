pub mod harmony;
pub mod score_keeper;
pub mod session;
