mod record;
mod run;
mod upsert;

pub use run::run;
