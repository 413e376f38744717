/*
 * Copyright (c) 2023 xvanc and contributors
 * SPDX-License-Identifier: BSD-3-Clause
 */

use anyhow::Context;
use clap::Parser;
use std::{
    env,
    ffi::OsString,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};
use symbol_map::{GenerateOptions, SymbolTable};

/// Convert the `nm` listing of an object file into a SYMF symbol map.
#[derive(Parser)]
#[clap(version)]
struct Arguments {
    /// Object file to list symbols from
    object: PathBuf,
    /// Where to write the symbol map
    output: PathBuf,

    /// Symbol-listing command [env: NM] [default: nm]
    #[clap(long)]
    nm: Option<OsString>,
    /// Demangle Rust symbol names
    #[clap(long)]
    demangle: bool,
    /// Log the command line and the number of skipped lines
    #[clap(short, long, conflicts_with = "quiet")]
    verbose: bool,
    /// Only log errors
    #[clap(short, long)]
    quiet: bool,
}

impl Arguments {
    fn log_level(&self) -> log::LevelFilter {
        match (self.verbose, self.quiet) {
            (true, _) => log::LevelFilter::Debug,
            (_, true) => log::LevelFilter::Error,
            _ => log::LevelFilter::Info,
        }
    }

    fn nm_cmd(&self) -> OsString {
        if let Some(cmd) = &self.nm {
            return cmd.clone();
        }
        if let Some(cmd) = env::var_os("NM") {
            return cmd;
        }
        OsString::from("nm")
    }
}

fn main() -> ExitCode {
    let args = Arguments::parse();
    env_logger::Builder::new()
        .filter_level(args.log_level())
        .format(|buf, rec| {
            let level = rec.level().as_str().to_ascii_lowercase();
            writeln!(buf, "{level}: {}", rec.args())
        })
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            log::error!("{error:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Arguments) -> anyhow::Result<()> {
    let options = GenerateOptions {
        demangle: args.demangle,
    };
    let table = symbol_map::generate(args.nm_cmd(), &args.object, options)
        .with_context(|| format!("cannot list symbols of {}", args.object.display()))?;

    write_symbol_map(&table, &args.output)?;

    log::info!(
        "wrote {} symbols ({} bytes of names) to {}",
        table.len(),
        table.strings().len(),
        args.output.display(),
    );

    Ok(())
}

/// Writes `table` to a temporary file next to `path`, then moves it into place.
///
/// `path` is only replaced once the whole map has been written. On failure the temporary
/// file is deleted and `path` is left as it was.
fn write_symbol_map(table: &SymbolTable, path: &Path) -> anyhow::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let file = tempfile::Builder::new()
        .prefix(".symf")
        .tempfile_in(dir)
        .with_context(|| format!("cannot create {}", path.display()))?;

    let mut writer = BufWriter::new(file);
    table
        .write_to(&mut writer)
        .and_then(|()| writer.flush())
        .with_context(|| format!("failed to write {}", path.display()))?;

    let file = writer
        .into_inner()
        .map_err(|error| error.into_error())
        .with_context(|| format!("failed to write {}", path.display()))?;
    file.as_file()
        .sync_all()
        .with_context(|| format!("failed to write {}", path.display()))?;

    file.persist(path)
        .map_err(|error| error.error)
        .with_context(|| format!("cannot create {}", path.display()))?;

    log::debug!("{}: {} bytes", path.display(), table.encoded_len());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use symbol_map::{SymbolKind, SymbolMap};

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Arguments::command().debug_assert();
    }

    #[test]
    fn nm_flag_wins_over_default() {
        let args = Arguments::parse_from(["symf", "--nm", "llvm-nm", "a.o", "a.symf"]);
        assert_eq!(args.nm_cmd(), "llvm-nm");
        assert_eq!(args.log_level(), log::LevelFilter::Info);
    }

    #[test]
    fn log_levels() {
        let args = Arguments::parse_from(["symf", "-v", "a.o", "a.symf"]);
        assert_eq!(args.log_level(), log::LevelFilter::Debug);
        let args = Arguments::parse_from(["symf", "-q", "a.o", "a.symf"]);
        assert_eq!(args.log_level(), log::LevelFilter::Error);
    }

    #[test]
    fn requires_two_positionals() {
        assert!(Arguments::try_parse_from(["symf"]).is_err());
        assert!(Arguments::try_parse_from(["symf", "a.o"]).is_err());
        assert!(Arguments::try_parse_from(["symf", "a.o", "b", "c"]).is_err());
    }

    #[test]
    fn writes_and_replaces_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.symf");
        std::fs::write(&path, b"old contents").unwrap();

        let mut table = SymbolTable::new();
        table.push(0x1000, SymbolKind::Global, b"main").unwrap();
        write_symbol_map(&table, &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes, table.to_bytes());
        let map = SymbolMap::new(&bytes).unwrap();
        assert_eq!(map.get(0).unwrap().name, b"main");

        // Only the output itself is left behind.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn missing_directory_is_a_creation_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.symf");

        let error = write_symbol_map(&SymbolTable::new(), &path).unwrap_err();
        assert!(error.to_string().starts_with("cannot create"));
        assert!(!path.exists());
    }
}
