mod authors;
mod genres;
mod relations;
mod run;
#[cfg(test)]
mod tests;
mod upsert;

pub use run::run;
