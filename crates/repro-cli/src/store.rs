use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, FixedOffset, Local};
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

pub const PROJECT_DIRS: [&str; 5] = ["sources", "workdata", "results", "scripts", "store"];

/// Nearest ancestor of `start` (inclusive) holding a `workdata/` directory.
pub fn find_project_root(start: &Path) -> Result<PathBuf> {
    let mut cur = Some(start);
    while let Some(p) = cur {
        if p.join("workdata").is_dir() {
            return Ok(p.to_path_buf());
        }
        cur = p.parent();
    }
    Err(anyhow!(
        "cannot find project root above {} (no workdata/ directory; run `repro init`)",
        start.display()
    ))
}

pub fn init_project(root: &Path) -> Result<Vec<PathBuf>> {
    let mut created = Vec::new();
    for dir in PROJECT_DIRS {
        let path = root.join(dir);
        fs::create_dir_all(&path).with_context(|| format!("create {}", path.display()))?;
        created.push(path);
    }
    let makefile = root.join("Makefile");
    fs::write(&makefile, "").with_context(|| format!("write {}", makefile.display()))?;
    created.push(makefile);

    let status = Command::new("git")
        .arg("init")
        .current_dir(root)
        .status()
        .context("run git init")?;
    if !status.success() {
        return Err(anyhow!("git init failed with {}", status));
    }
    Ok(created)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeState {
    pub dirty: bool,
    pub has_untracked: bool,
}

/// Reads `git status --porcelain`: a modification marks the tree dirty, an
/// untracked path marks it as having untracked files.
pub fn parse_porcelain(status: &str) -> TreeState {
    let mut state = TreeState::default();
    for line in status.lines() {
        let flags = line.trim().split(' ').next().unwrap_or("");
        if flags.contains('M') {
            state.dirty = true;
        } else if flags.contains('?') {
            state.has_untracked = true;
        }
    }
    state
}

fn git_output(root: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(root)
        .output()
        .with_context(|| format!("run git {}", args.join(" ")))?;
    if !output.status.success() {
        return Err(anyhow!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

pub fn resolve_commit(root: &Path, spec: &str) -> Result<String> {
    git_output(root, &["rev-parse", spec])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreHeader {
    pub hash: String,
    pub timestamp: DateTime<FixedOffset>,
    pub state: TreeState,
}

impl StoreHeader {
    pub fn short_hash(&self) -> &str {
        &self.hash[..self.hash.len().min(7)]
    }

    pub fn file_name(&self) -> String {
        format!(
            "{}-{}{}",
            self.timestamp.format("%Y%m%d%H%M%S"),
            self.short_hash(),
            if self.state.dirty { "-dirty" } else { "" }
        )
    }

    pub fn render(&self) -> String {
        let mut out = format!(
            "Hash: {}\nTimestamp: {}\n",
            self.hash,
            self.timestamp.format("%Y-%m-%dT%H:%M:%S%.6f%z")
        );
        if self.state.dirty {
            out.push_str("Dirty: 1\n");
        }
        if self.state.has_untracked {
            out.push_str("HasUntracked: 1\n");
        }
        out.push('\n');
        out
    }
}

pub struct StoredEntry {
    pub relative: String,
    pub dirty: bool,
}

/// Copies `input` into `store/<tag>/` under a name derived from the current
/// commit. With `tee`, every line also goes to `echo`. Bytes are stored as
/// received.
pub fn store_output<R: BufRead, W: Write>(
    root: &Path,
    tag: &str,
    input: R,
    tee: Option<&mut W>,
) -> Result<StoredEntry> {
    let hash = resolve_commit(root, "HEAD")?;
    let state = parse_porcelain(&git_output(root, &["status", "--porcelain"])?);
    let header = StoreHeader {
        hash,
        timestamp: Local::now().fixed_offset(),
        state,
    };
    let path = write_entry(root, tag, &header, input, tee)?;
    tracing::info!(path = %path.display(), dirty = state.dirty, "stored output");
    Ok(StoredEntry {
        relative: format!("{}/{}", tag, header.file_name()),
        dirty: state.dirty,
    })
}

pub fn write_entry<R: BufRead, W: Write>(
    root: &Path,
    tag: &str,
    header: &StoreHeader,
    mut input: R,
    mut tee: Option<&mut W>,
) -> Result<PathBuf> {
    let dir = root.join("store").join(tag);
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    let path = dir.join(header.file_name());
    let mut file = fs::File::create(&path).with_context(|| format!("create {}", path.display()))?;
    file.write_all(header.render().as_bytes())?;
    let mut line = Vec::new();
    loop {
        line.clear();
        if input.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        file.write_all(&line)?;
        if let Some(out) = tee.as_deref_mut() {
            out.write_all(&line)?;
            out.flush()?;
        }
    }
    file.sync_all()?;
    Ok(path)
}

#[derive(Debug, Clone, Default)]
pub struct LoadFilter {
    pub tag: Option<String>,
    /// Hash prefix to match; `None` loads everything.
    pub commit: Option<String>,
    pub raw: bool,
    pub exclude_dirty: bool,
}

fn tag_dirs(store: &Path, tag: Option<&str>) -> Result<Vec<PathBuf>> {
    if let Some(tag) = tag {
        return Ok(vec![store.join(tag)]);
    }
    let mut dirs = Vec::new();
    for entry in walkdir::WalkDir::new(store)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        if entry.file_type().is_dir() {
            dirs.push(entry.into_path());
        }
    }
    Ok(dirs)
}

fn entry_matches(name: &str, filter: &LoadFilter) -> bool {
    if filter.exclude_dirty && name.ends_with("-dirty") {
        return false;
    }
    match &filter.commit {
        Some(hash) => {
            let short = &hash[..hash.len().min(7)];
            name.contains(&format!("-{}", short))
        }
        None => true,
    }
}

/// Body of a stored file; with `raw` the header block and its blank
/// separator line are dropped.
pub fn render_entry(contents: &[u8], raw: bool) -> &[u8] {
    if !raw {
        return contents;
    }
    match contents.windows(2).position(|pair| pair == b"\n\n") {
        Some(end) => &contents[end + 2..],
        None => &[],
    }
}

pub fn load_entries<W: Write>(root: &Path, filter: &LoadFilter, out: &mut W) -> Result<usize> {
    let store = root.join("store");
    let mut printed = 0;
    for tag_dir in tag_dirs(&store, filter.tag.as_deref())? {
        if !tag_dir.is_dir() {
            continue;
        }
        if filter.tag.is_none() && !filter.raw {
            let name = tag_dir.file_name().map(|n| n.to_string_lossy().into_owned());
            writeln!(out, "[{}]", name.unwrap_or_default())?;
        }
        for entry in walkdir::WalkDir::new(&tag_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if !entry_matches(&name, filter) {
                continue;
            }
            let contents = fs::read(entry.path())
                .with_context(|| format!("read {}", entry.path().display()))?;
            out.write_all(render_entry(&contents, filter.raw))?;
            printed += 1;
        }
    }
    Ok(printed)
}
