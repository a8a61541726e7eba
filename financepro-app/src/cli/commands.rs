use crate::cli::opts::*;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use financepro_core::{Amount, Expense, StoreError, UserData};
use financepro_json::{StoreOptions, UserStore};
use std::io::{stdin, stdout, BufRead, Write};
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

pub fn run_cli(args: Cli) -> Result<()> {
    let options = StoreOptions {
        root: args.data_dir.clone(),
        max_backups: args.max_backups,
    };

    let open = || open_store(&args.user, &options);
    match args.cmd {
        Command::Reset => {
            let store = UserStore::recover_corrupt(&args.user, &options)?;
            println!(
                "{}: {} expenses after reset",
                store.username(),
                store.combined().expenses.len()
            );
        }
        Command::Add(a) => {
            let expense = to_expense(&a)?;
            let mut store = open()?;
            store.add_expense(expense);
            store.save()?;
            println!("{}", store.combined().expenses.len());
        }
        Command::Tag { tag } => {
            let tag = tag.trim();
            if tag.is_empty() {
                bail!("tag must not be blank");
            }
            let mut store = open()?;
            if store.add_tag(tag) {
                store.save()?;
                println!("ok");
            } else {
                println!("tag already exists");
            }
        }
        Command::List => print_expenses(&mut stdout(), open()?.combined())?,
        Command::Indices => print_indices(&mut stdout(), open()?.combined())?,
        Command::Info => {
            let store = open()?;
            let c = store.config();
            println!("user\t{}", c.username);
            println!("launches\t{}", c.launches);
            println!("data_size\t{}", c.data_size);
            println!("data\t{}", store.paths().data.display());
            println!("config\t{}", store.paths().config.display());
        }
        Command::ExportCsv { path } => {
            export_csv(&path, open()?.combined())?;
            println!("wrote {}", path.display());
        }
        Command::Shell => {
            let mut store = open()?;
            let input = stdin();
            run_shell(&mut store, &mut input.lock(), &mut stdout())?;
        }
    }
    Ok(())
}

pub fn open_store(user: &str, options: &StoreOptions) -> Result<UserStore> {
    match UserStore::open(user, options) {
        Ok(s) => Ok(s),
        Err(e @ StoreError::CorruptData { .. }) => Err(anyhow!(e).context(format!(
            "data for {user} is unreadable; run `financepro --user {user} reset` to move it aside"
        ))),
        Err(e) => Err(e.into()),
    }
}

pub fn to_expense(a: &ExpenseArgs) -> Result<Expense> {
    let amount = Amount::from_str(&a.amount)?;
    let mut e = Expense::new(amount, a.name.trim(), a.category.trim())
        .with_tags(a.tags.iter().map(|t| t.trim()));
    if let Some(when) = &a.at {
        e = e.at(parse_when(when)?);
    }
    if let Some(d) = &a.description {
        e = e.with_description(d.as_str());
    }
    if let Some(n) = &a.notes {
        e = e.with_notes(n.as_str());
    }
    e.validate()?;
    Ok(e)
}

/// Interactive session over `input`. Nothing reaches disk until `save`.
pub fn run_shell<R: BufRead, W: Write>(
    store: &mut UserStore,
    input: &mut R,
    out: &mut W,
) -> Result<()> {
    writeln!(
        out,
        "{}: {} expenses. commands: add, tag <name>, list, indices, pending, save, revert, quit",
        store.username(),
        store.combined().expenses.len()
    )?;
    loop {
        let Some(line) = prompt(input, out, "> ")? else {
            break;
        };
        let line = line.trim();
        let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
        match cmd {
            "" => {}
            "add" => match read_expense(input, out)? {
                Some(e) => {
                    store.add_expense(e);
                    writeln!(out, "staged ({} pending)", store.pending_count())?;
                }
                None => writeln!(out, "cancelled")?,
            },
            "tag" => {
                let tag = rest.trim();
                if tag.is_empty() {
                    writeln!(out, "usage: tag <name>")?;
                } else if store.add_tag(tag) {
                    writeln!(out, "staged tag {tag}")?;
                } else {
                    writeln!(out, "tag {tag} already exists")?;
                }
            }
            "list" => print_expenses(out, store.combined())?,
            "indices" => print_indices(out, store.combined())?,
            "pending" => {
                writeln!(out, "{} pending", store.pending_count())?;
                print_expenses(out, store.staged())?;
            }
            "save" => {
                if store.save()? {
                    writeln!(out, "saved")?;
                } else {
                    writeln!(out, "nothing to save")?;
                }
            }
            "revert" => {
                store.revert();
                writeln!(out, "reverted")?;
            }
            "quit" | "q" | "exit" => {
                if !store.has_changes() {
                    break;
                }
                let answer = prompt(
                    input,
                    out,
                    &format!("discard {} pending entries? [y/N] ", store.pending_count()),
                )?;
                if matches!(answer.as_deref().map(str::trim), Some("y" | "Y" | "yes")) {
                    store.revert();
                    break;
                }
            }
            other => writeln!(out, "unknown command {other:?}")?,
        }
    }
    if store.has_changes() {
        warn!(
            "input ended with {} unsaved entries; they were not written",
            store.pending_count()
        );
    }
    Ok(())
}

fn read_expense<R: BufRead, W: Write>(input: &mut R, out: &mut W) -> Result<Option<Expense>> {
    let mut fields = Vec::new();
    for label in ["amount", "name", "category", "tags (comma separated)", "when (optional)"] {
        match prompt(input, out, &format!("{label}: "))? {
            Some(v) => fields.push(v.trim().to_string()),
            None => return Ok(None),
        }
    }
    let args = ExpenseArgs {
        amount: fields[0].clone(),
        name: fields[1].clone(),
        category: fields[2].clone(),
        tags: fields[3]
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect(),
        at: Some(fields[4].clone()).filter(|s| !s.is_empty()),
        description: None,
        notes: None,
    };
    match to_expense(&args) {
        Ok(e) => Ok(Some(e)),
        Err(e) => {
            writeln!(out, "rejected: {e}")?;
            Ok(None)
        }
    }
}

fn export_csv(path: &Path, data: &UserData) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("Unable to create {}", path.display()))?;
    wtr.write_record(["amount", "name", "category", "tags", "occurred_at", "description", "notes"])?;
    for e in &data.expenses {
        wtr.write_record([
            e.amount.to_string(),
            e.name.clone(),
            e.category.clone(),
            join_tags(e),
            e.occurred_at.map(|t| t.to_string()).unwrap_or_default(),
            e.description.clone().unwrap_or_default(),
            e.notes.clone().unwrap_or_default(),
        ])?;
    }
    wtr.flush()?;
    info!("exported {} expenses to {}", data.expenses.len(), path.display());
    Ok(())
}

// ===== Helpers =====
fn print_expenses<W: Write>(out: &mut W, data: &UserData) -> Result<()> {
    if data.expenses.is_empty() {
        writeln!(out, "no expenses")?;
    }
    for (i, e) in data.expenses.iter().enumerate() {
        let when = e.occurred_at.map(|t| t.to_string()).unwrap_or_else(|| "-".into());
        let tags = if e.tags.is_empty() { "-".to_string() } else { join_tags(e) };
        writeln!(out, "{}\t{}\t{}\t{}\ttags={}\t{}", i + 1, e.amount, e.name, e.category, tags, when)?;
    }
    Ok(())
}

fn print_indices<W: Write>(out: &mut W, data: &UserData) -> Result<()> {
    let join = |s: &std::collections::BTreeSet<String>| s.iter().cloned().collect::<Vec<_>>().join(", ");
    writeln!(out, "names\t{}", join(&data.names))?;
    writeln!(out, "categories\t{}", join(&data.categories))?;
    writeln!(out, "tags\t{}", join(&data.tags))?;
    Ok(())
}

fn join_tags(e: &Expense) -> String {
    e.tags.iter().cloned().collect::<Vec<_>>().join(";")
}

fn parse_when(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(t);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| anyhow!("invalid date/time {s:?}"))
}

fn prompt<R: BufRead, W: Write>(input: &mut R, out: &mut W, label: &str) -> Result<Option<String>> {
    write!(out, "{label}")?;
    out.flush().ok();
    let mut s = String::new();
    if input.read_line(&mut s)? == 0 {
        return Ok(None);
    }
    Ok(Some(s))
}
