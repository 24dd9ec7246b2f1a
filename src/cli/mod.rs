//! Rule management subcommands.
//!
//! Each command talks to the store once and writes its result to `out`.
//! Errors are returned to the binary, which prints them and exits non-zero.

pub mod output;

use std::io::Write;

use anyhow::{bail, Context, Result};
use tracing::debug;

use crate::config::{AddArgs, DeleteArgs, GetArgs};
use crate::domain::rule::parse_annotations;
use crate::domain::Rule;
use crate::policy::load_rule;
use crate::storage::{AddOutcome, RuleStore};

/// `kir add`: create a rule, or replace one with `--override`.
pub async fn add(store: &dyn RuleStore, args: &AddArgs, out: &mut impl Write) -> Result<()> {
    let rule = rule_from_args(args)?;
    debug!(rule = %rule.name, override_existing = args.override_existing, "Adding rule");

    match store.add(&rule, args.override_existing).await? {
        AddOutcome::Created => writeln!(out, "Rule \"{}\" added.", rule.name)?,
        AddOutcome::Replaced => writeln!(out, "Rule \"{}\" updated.", rule.name)?,
    }
    Ok(())
}

/// Build a rule from `add` flags, or from the file given with `-f`.
pub fn rule_from_args(args: &AddArgs) -> Result<Rule> {
    if let Some(path) = &args.file {
        return load_rule(path)
            .with_context(|| format!("Cannot load rule from {}", path.display()));
    }

    let name = args.name.as_deref().unwrap_or_default();
    if name.is_empty() {
        bail!("Rule name is empty. Use --name flag");
    }
    if args.images.is_empty() {
        bail!("List of images is empty. Use --image flag");
    }
    let namespace = args.namespace.as_deref().unwrap_or_default();
    if namespace.is_empty() {
        bail!("Namespace is empty. Use --namespace flag");
    }

    let annotations = parse_annotations(&args.annotations).map_err(anyhow::Error::msg)?;

    Ok(Rule {
        name: name.to_string(),
        namespace: namespace.to_string(),
        image_patterns: args.images.clone(),
        annotations,
        allowed: args.allowed,
        reason: args.reason.clone(),
    })
}

/// `kir get`: show one rule, or list rules as a table.
pub async fn get(store: &dyn RuleStore, args: &GetArgs, out: &mut impl Write) -> Result<()> {
    match args.output.as_deref() {
        None | Some("yaml") => {}
        Some(format) => bail!("Format \"{}\" is not supported", format),
    }

    let Some(name) = &args.name else {
        if args.output.is_some() {
            bail!("Output format is only supported when getting a single rule");
        }

        let listing = store.list(args.effective_limit()).await?;
        out.write_all(output::render_table(&listing.rules).as_bytes())?;
        if listing.is_truncated() {
            writeln!(
                out,
                "\nShowing {} of {} rules. Use --show-all to list every rule.",
                listing.rules.len(),
                listing.total
            )?;
        }
        return Ok(());
    };

    let rule = store.get(name).await?;
    let rendered = match args.output.as_deref() {
        Some("yaml") => output::render_yaml(&rule)?,
        _ => output::render_table(std::slice::from_ref(&rule)),
    };
    out.write_all(rendered.as_bytes())?;
    Ok(())
}

/// `kir delete`: remove a rule by name.
pub async fn delete(store: &dyn RuleStore, args: &DeleteArgs, out: &mut impl Write) -> Result<()> {
    let deleted = store.delete(&args.name).await?;
    writeln!(out, "Deleted rules: {}", deleted)?;
    Ok(())
}
