use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use catalog::{
    all_tags, builtin_registry, download, load_dir, query, CatalogFilter, ShaderEntry,
    ShaderRegistry,
};
use galleryconfig::SessionConfig;
use renderer::{validate_fragment, ProgramFactory};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, SearchArgs};
use crate::paths::AppPaths;
use crate::preview;

#[derive(Serialize)]
struct EntryView<'a> {
    id: &'a str,
    name: &'a str,
    description: &'a str,
    tags: &'a [String],
}

impl<'a> From<&'a ShaderEntry> for EntryView<'a> {
    fn from(entry: &'a ShaderEntry) -> Self {
        Self {
            id: entry.id(),
            name: entry.name(),
            description: entry.description(),
            tags: entry.tags(),
        }
    }
}

#[derive(Serialize)]
struct DetailView<'a> {
    #[serde(flatten)]
    entry: EntryView<'a>,
    time_uniform: &'a str,
    resolution_uniform: &'a str,
    source_bytes: usize,
    file_name: String,
}

pub fn run(cli: Cli) -> Result<()> {
    initialise_tracing();

    let registry = load_registry(cli.catalog.as_deref())?;
    tracing::debug!(entries = registry.len(), "catalog ready");

    match cli.command {
        Command::List => print_entries(registry.list(), cli.json),
        Command::Search(args) => search(&registry, &args, cli.json),
        Command::Tags => print_tags(&registry, cli.json),
        Command::Show { id } => show(&registry, &id, cli.json),
        Command::Source { id } => {
            let source = registry.source_text(&id)?;
            let mut stdout = io::stdout().lock();
            stdout.write_all(source.as_bytes())?;
            stdout.flush()?;
            Ok(())
        }
        Command::Export { id, dir } => {
            let path = download(&registry, &id)?
                .write_into(&dir)
                .with_context(|| format!("failed to export '{id}' into {}", dir.display()))?;
            println!("{}", path.display());
            Ok(())
        }
        Command::Check { id } => check(&registry, id.as_deref()),
        Command::Preview(args) => {
            let config = load_session_config(cli.config.as_deref())?;
            preview::run(Arc::new(registry), config, args)
        }
    }
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn load_registry(dir: Option<&Path>) -> Result<ShaderRegistry> {
    match dir {
        Some(dir) => {
            let registry = load_dir(dir)
                .with_context(|| format!("failed to load catalog from {}", dir.display()))?;
            tracing::info!(
                root = %dir.display(),
                entries = registry.len(),
                "loaded catalog directory"
            );
            Ok(registry)
        }
        None => builtin_registry().context("built-in catalog is invalid"),
    }
}

fn load_session_config(explicit: Option<&Path>) -> Result<SessionConfig> {
    if let Some(path) = explicit {
        return SessionConfig::load(path)
            .with_context(|| format!("failed to load session config {}", path.display()));
    }
    let path = AppPaths::discover()?.session_config();
    if path.is_file() {
        tracing::info!(path = %path.display(), "using session config");
        SessionConfig::load(&path)
            .with_context(|| format!("failed to load session config {}", path.display()))
    } else {
        tracing::debug!(path = %path.display(), "no session config; using defaults");
        Ok(SessionConfig::default())
    }
}

fn print_entries<'a>(entries: impl Iterator<Item = &'a ShaderEntry>, json: bool) -> Result<()> {
    if json {
        let views: Vec<EntryView<'_>> = entries.map(EntryView::from).collect();
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }
    for entry in entries {
        let tags = entry.tags().join(", ");
        println!("{:<16} {:<16} [{}]", entry.id(), entry.name(), tags);
    }
    Ok(())
}

fn search(registry: &ShaderRegistry, args: &SearchArgs, json: bool) -> Result<()> {
    let mut filter = CatalogFilter::new().with_search(args.term.as_str());
    for tag in &args.tags {
        filter = filter.with_tag(tag.as_str());
    }
    print_entries(query(registry, &filter), json)
}

fn print_tags(registry: &ShaderRegistry, json: bool) -> Result<()> {
    let tags = all_tags(registry);
    if json {
        println!("{}", serde_json::to_string_pretty(&tags)?);
    } else {
        for tag in tags {
            println!("{tag}");
        }
    }
    Ok(())
}

fn show(registry: &ShaderRegistry, id: &str, json: bool) -> Result<()> {
    let entry = registry.get(id)?;
    let bindings = &entry.program_source().bindings;
    let view = DetailView {
        entry: EntryView::from(entry),
        time_uniform: &bindings.time,
        resolution_uniform: &bindings.resolution,
        source_bytes: entry.source_text().len(),
        file_name: download(registry, id)?.file_name,
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }
    println!("id:          {}", view.entry.id);
    println!("name:        {}", view.entry.name);
    println!("description: {}", view.entry.description);
    println!("tags:        {}", view.entry.tags.join(", "));
    println!(
        "uniforms:    {} (time), {} (resolution)",
        view.time_uniform, view.resolution_uniform
    );
    println!(
        "source:      {} ({} bytes)",
        view.file_name, view.source_bytes
    );
    Ok(())
}

fn check(registry: &ShaderRegistry, only: Option<&str>) -> Result<()> {
    let entries: Vec<&ShaderEntry> = match only {
        Some(id) => vec![registry.get(id)?],
        None => registry.list().collect(),
    };

    let mut failed = 0;
    for entry in &entries {
        match validate_fragment(entry.source_text()) {
            Ok(translated) => {
                println!(
                    "ok    {} ({} uniforms)",
                    entry.id(),
                    translated.block.members().len().saturating_sub(1)
                );
            }
            Err(err) => {
                failed += 1;
                println!("fail  {}: {err}", entry.id());
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} shader(s) failed validation", entries.len());
    }
    Ok(())
}
