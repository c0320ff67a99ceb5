//! Curation of the first-party model catalog.
//!
//! The upstream catalog lists every pinned revision, tuning variant and experiment. Clients
//! get the two newest `gemini-X.Y` generations, newest first, followed by the `gemma`
//! family ordered by parameter count.

use std::{cmp::Reverse, sync::LazyLock};

use itertools::Itertools;
use regex::Regex;

static VERSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"gemini-(\d+)\.(\d+)").expect("valid regex"));
static PINNED_REVISION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-\d{3}$").expect("valid regex"));
static DATED_PREVIEW: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-preview-\d{2}-\d{2}$").expect("valid regex"));

const GENERATIONS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Version(u32, u32);

struct Candidate {
    name: String,
    version: Version,
    priority: u8,
}

/// Orders and filters bare model names (without the `models/` prefix).
pub(crate) fn curate(names: impl IntoIterator<Item = String>) -> Vec<String> {
    let (gemini, gemma): (Vec<_>, Vec<_>) = names
        .into_iter()
        .filter(|name| name.contains("gemini") || name.contains("gemma"))
        .partition(|name| name.contains("gemini"));

    let mut candidates: Vec<Candidate> = gemini
        .into_iter()
        .filter(|name| is_release(name))
        .filter_map(|name| {
            let version = version(&name)?;
            let priority = priority(&name);

            Some(Candidate { name, version, priority })
        })
        .collect();

    let newest: Vec<Version> = candidates
        .iter()
        .map(|candidate| candidate.version)
        .sorted_unstable_by_key(|version| Reverse(*version))
        .dedup()
        .take(GENERATIONS)
        .collect();

    candidates.retain(|candidate| newest.contains(&candidate.version));

    // Everything descending, including the priority: base names come before dated
    // previews, then generic previews, then `-latest` aliases.
    candidates.sort_by(|a, b| (b.version, b.priority, &b.name).cmp(&(a.version, a.priority, &a.name)));

    let mut gemma = gemma;
    gemma.sort_by_key(|name| {
        let size = parameter_count(name);
        (size.is_none(), size)
    });

    candidates
        .into_iter()
        .map(|candidate| candidate.name)
        .unique()
        .chain(gemma)
        .collect()
}

fn is_release(name: &str) -> bool {
    if name.contains("gemini-exp") || name.contains("-tuning") {
        return false;
    }

    let base = name.split("-tuning").next().unwrap_or(name);
    !PINNED_REVISION.is_match(base)
}

fn version(name: &str) -> Option<Version> {
    let captures = VERSION.captures(name)?;
    let major = captures[1].parse().ok()?;
    let minor = captures[2].parse().ok()?;

    let version = Version(major, minor);
    (version > Version(0, 0)).then_some(version)
}

fn priority(name: &str) -> u8 {
    if name.contains("-latest") {
        0
    } else if name.contains("-preview") {
        if DATED_PREVIEW.is_match(name) { 2 } else { 1 }
    } else {
        3
    }
}

/// `gemma-3-27b-it` has 27 (billion) parameters.
fn parameter_count(name: &str) -> Option<u32> {
    let size = name.split('-').nth(2)?;
    let digits = size.get(..size.len().checked_sub(1)?)?;

    digits.parse().ok()
}
