use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Rebuild readable table and column names for a hash-renamed SQLite database",
    long_about = None
)]
pub struct Cli {
    /// Path to the original database with human-readable schema names
    #[arg(short = 'r', long = "originalDBPath")]
    pub original_db_path: PathBuf,
    /// Path to the hashed (latest) database
    #[arg(short = 'n', long = "hashedDBPath")]
    pub hashed_db_path: PathBuf,
    /// Path for the generated database
    #[arg(short = 'g', long = "generatedDBPath", default_value = "jp_fixed.db")]
    pub generated_db_path: PathBuf,
    /// Also write a table_mapping.json of original -> hashed table names
    #[arg(short = 't', long = "generateTableMapping")]
    pub generate_table_mapping: bool,
    /// File listing the only original tables to process, one name per line
    #[arg(short = 'f', long = "filter")]
    pub filter: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn required_flags_are_enforced() {
        let result = Cli::try_parse_from(["db-remap", "-r", "old.db"]);
        assert!(result.is_err());
    }

    #[test]
    fn defaults_apply_when_optional_flags_are_omitted() {
        let cli = Cli::try_parse_from(["db-remap", "-r", "old.db", "-n", "new.db"])
            .expect("parse minimal args");
        assert_eq!(cli.generated_db_path, PathBuf::from("jp_fixed.db"));
        assert!(!cli.generate_table_mapping);
        assert!(cli.filter.is_none());
    }

    #[test]
    fn long_flag_spelling_matches_the_documented_surface() {
        let cli = Cli::try_parse_from([
            "db-remap",
            "--originalDBPath",
            "old.db",
            "--hashedDBPath",
            "new.db",
            "--generatedDBPath",
            "out.db",
            "--generateTableMapping",
            "--filter",
            "tables.txt",
        ])
        .expect("parse full args");
        assert_eq!(cli.generated_db_path, PathBuf::from("out.db"));
        assert!(cli.generate_table_mapping);
        assert_eq!(cli.filter, Some(PathBuf::from("tables.txt")));
    }

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
