use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

pub const DEFAULT_DB_PATH: &str = "catalogue.sqlite";

#[derive(Parser, Debug)]
#[command(
    name = "catalogue-loader",
    version,
    about = "Bulk loader for the audiobook and text edition catalogue"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    ImportAudiobooks(ImportAudiobooksArgs),
    ImportTexts(ImportTextsArgs),
    Link(LinkArgs),
    MarkTop(MarkTopArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ImportAudiobooksArgs {
    #[arg(long, env = "CATALOGUE_DB_PATH", default_value = DEFAULT_DB_PATH)]
    pub db_path: PathBuf,

    #[arg(long, default_value = "litresru.csv")]
    pub file: PathBuf,

    #[arg(long, default_value_t = 1000)]
    pub batch_size: usize,

    #[arg(long)]
    pub summary_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ImportTextsArgs {
    #[arg(long, env = "CATALOGUE_DB_PATH", default_value = DEFAULT_DB_PATH)]
    pub db_path: PathBuf,

    #[arg(long, default_value = "litresru-full.csv")]
    pub file: PathBuf,

    #[arg(long, default_value_t = 5000)]
    pub batch_size: usize,

    #[arg(long)]
    pub summary_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct LinkArgs {
    #[arg(long, env = "CATALOGUE_DB_PATH", default_value = DEFAULT_DB_PATH)]
    pub db_path: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct MarkTopArgs {
    #[arg(long, env = "CATALOGUE_DB_PATH", default_value = DEFAULT_DB_PATH)]
    pub db_path: PathBuf,

    #[arg(long, default_value = "litresru-top.csv")]
    pub file: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, env = "CATALOGUE_DB_PATH", default_value = DEFAULT_DB_PATH)]
    pub db_path: PathBuf,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn import_audiobooks_defaults() {
        let cli = Cli::try_parse_from(["catalogue-loader", "import-audiobooks", "--file", "a.csv"])
            .unwrap();
        let Commands::ImportAudiobooks(args) = cli.command else {
            panic!("expected import-audiobooks");
        };
        assert_eq!(args.file, PathBuf::from("a.csv"));
        assert_eq!(args.batch_size, 1000);
        assert!(args.summary_path.is_none());
    }

    #[test]
    fn import_texts_accepts_batch_size() {
        let cli = Cli::try_parse_from([
            "catalogue-loader",
            "import-texts",
            "--file",
            "t.csv",
            "--batch-size",
            "250",
            "--db-path",
            "/tmp/c.sqlite",
        ])
        .unwrap();
        let Commands::ImportTexts(args) = cli.command else {
            panic!("expected import-texts");
        };
        assert_eq!(args.batch_size, 250);
        assert_eq!(args.db_path, PathBuf::from("/tmp/c.sqlite"));
    }

    #[test]
    fn rejects_non_numeric_batch_size() {
        let parsed =
            Cli::try_parse_from(["catalogue-loader", "import-texts", "--batch-size", "many"]);
        assert!(parsed.is_err());
    }
}
