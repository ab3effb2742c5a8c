//! Component B: turning a dotted glob query into the set of matching paths.
//!
//! Three stages: pre-process the query into one or more filesystem-style
//! candidate patterns, select matching paths (via the trigram index when
//! one is published and the pattern allows it, otherwise by walking the
//! filesystem), then post-process each match by statting it to decide
//! whether it is a metric leaf or an intermediate branch.

use super::matcher;
use super::tokenizer::required_trigrams;
use crate::index::Snapshot;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// One resolved path, already converted back to dotted form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// Dotted metric or branch name, e.g. `servers.web1.cpu`.
    pub path: String,
    /// `true` for a `.wsp` leaf, `false` for an intermediate branch.
    pub is_leaf: bool,
}

/// Resolves glob queries against a data root, optionally accelerated by a
/// published trigram index.
pub struct GlobExpander<'a> {
    data_root: &'a Path,
    max_globs: usize,
}

impl<'a> GlobExpander<'a> {
    #[must_use]
    pub fn new(data_root: &'a Path, max_globs: usize) -> Self {
        Self { data_root, max_globs }
    }

    /// Expands `query` into its matching paths. `snapshot` is consulted
    /// when present and the pattern doesn't force a filesystem walk.
    #[must_use]
    pub fn expand(&self, query: &str, snapshot: Option<&Snapshot>) -> Vec<Match> {
        let use_filesystem_glob = should_use_filesystem_glob(query);
        // Snapshot paths are stored leading-slash (`/servers/web1/cpu.wsp`,
        // see `index::builder::walk_paths`); candidate patterns must carry
        // the same leading slash or `select_via_index`'s match against
        // `snapshot.path(id)` fails at byte 0 for every candidate.
        let mut fs_query = query.replace('.', "/");
        if !fs_query.starts_with('/') {
            fs_query = format!("/{fs_query}");
        }

        let mut candidates = Vec::new();
        if !fs_query.ends_with('*') {
            candidates.push(format!("{fs_query}.wsp"));
        }
        candidates.push(fs_query);
        let candidates = expand_braces(candidates, self.max_globs);

        let raw: Vec<String> = if !use_filesystem_glob {
            if let Some(snapshot) = snapshot {
                self.select_via_index(&candidates, snapshot)
            } else {
                self.select_via_filesystem(&candidates)
            }
        } else {
            self.select_via_filesystem(&candidates)
        };

        self.stat_and_convert(raw)
    }

    /// Index-branch selection: intersect each candidate's required trigram
    /// postings, then confirm every surviving candidate with a real glob
    /// match (this also recovers correctness when a required trigram was
    /// pruned or simply absent from the posting map). Results are sorted
    /// so the index branch has a stable, documented order.
    fn select_via_index(&self, candidates: &[String], snapshot: &Snapshot) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for pattern in candidates {
            let required = required_trigrams(pattern);
            let ids: Box<dyn Iterator<Item = u32>> = if required.is_empty() {
                Box::new(0..snapshot.len() as u32)
            } else {
                let mut acc: Option<roaring::RoaringBitmap> = None;
                for trigram in &required {
                    if let Some(postings) = snapshot.trigrams.get(trigram) {
                        acc = Some(match acc {
                            None => postings.clone(),
                            Some(a) => a & postings,
                        });
                    }
                }
                match acc {
                    Some(bitmap) => Box::new(bitmap.into_iter()),
                    None => Box::new(0..snapshot.len() as u32),
                }
            };

            for id in ids {
                let Some(candidate_path) = snapshot.path(id) else {
                    continue;
                };
                if matcher::matches(pattern, candidate_path) && seen.insert(candidate_path.to_string()) {
                    out.push(candidate_path.to_string());
                }
            }
        }

        out.sort_unstable();
        out
    }

    /// Filesystem-branch selection: walk one path segment at a time,
    /// sorting each directory's entries for determinism.
    fn select_via_filesystem(&self, candidates: &[String]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for candidate in candidates {
            let segments: Vec<&str> = candidate.trim_start_matches('/').split('/').collect();
            let mut matches = Vec::new();
            walk_segments(self.data_root, &segments, &PathBuf::new(), &mut matches);
            for m in matches {
                let rel = m.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/");
                let mut leading = String::from("/");
                leading.push_str(&rel);
                if seen.insert(leading.clone()) {
                    out.push(leading);
                }
            }
        }

        out
    }

    /// Confirms each raw path actually exists on disk, classifies it as a
    /// leaf or branch, and converts it back to dotted form. Paths that no
    /// longer stat cleanly are silently dropped.
    fn stat_and_convert(&self, raw: Vec<String>) -> Vec<Match> {
        let mut out = Vec::with_capacity(raw.len());
        for path in raw {
            let relative = path.trim_start_matches('/');
            let fs_path = self.data_root.join(relative);
            let Ok(metadata) = fs::metadata(&fs_path) else {
                continue;
            };
            let is_leaf = metadata.is_file();
            let dotted = relative
                .strip_suffix(".wsp")
                .unwrap_or(relative)
                .replace('/', ".");
            out.push(Match { path: dotted, is_leaf });
        }
        out
    }
}

/// True for the "prefix or exact" case: no `[`, no `?`, and either no `*`
/// or a single trailing `*`. These patterns resolve with a constant-depth
/// `readdir` as fast as an index lookup would, so the index is skipped
/// entirely (§4.B step 1). Anything more complex (a mid-pattern `*`, `?`,
/// or a character class) goes through the trigram index when one is
/// published.
fn should_use_filesystem_glob(query: &str) -> bool {
    if query.contains('[') || query.contains('?') {
        return false;
    }
    match query.matches('*').count() {
        0 => true,
        1 => query.ends_with('*'),
        _ => false,
    }
}

/// Repeatedly expands the leftmost `{a,b,c}` group found in any candidate,
/// capping the live candidate count at `max_globs`. Truncation past the
/// cap is silent.
fn expand_braces(initial: Vec<String>, max_globs: usize) -> Vec<String> {
    let mut out = initial;
    loop {
        let Some(i) = out.iter().position(|c| c.contains('{')) else {
            break;
        };
        let cand = out[i].clone();
        let open = cand.find('{').unwrap();
        let Some(close_offset) = cand[open..].find('}') else {
            break; // unterminated group: leave the literal '{' as-is
        };
        let close = open + close_offset;
        let prefix = &cand[..open];
        let suffix = &cand[close + 1..];

        let mut replacement = Vec::new();
        for (n, alt) in cand[open + 1..close].split(',').enumerate() {
            if n > 0 && out.len() - 1 + replacement.len() >= max_globs {
                break;
            }
            replacement.push(format!("{prefix}{alt}{suffix}"));
        }
        if replacement.is_empty() {
            replacement.push(cand.clone());
        }
        out.splice(i..=i, replacement);
    }
    out
}

/// Recursively matches `segments` against directory entries under
/// `root.join(prefix)`, collecting matching relative paths into `out`.
fn walk_segments(root: &Path, segments: &[&str], prefix: &Path, out: &mut Vec<PathBuf>) {
    let Some((seg, rest)) = segments.split_first() else {
        out.push(prefix.to_path_buf());
        return;
    };

    let Ok(read_dir) = fs::read_dir(root.join(prefix)) else {
        return;
    };
    let mut names: Vec<String> = read_dir
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort_unstable();

    for name in names {
        if matcher::matches(seg, &name) {
            walk_segments(root, rest, &prefix.join(&name), out);
        }
    }
}
