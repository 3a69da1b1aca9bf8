//! Fixture handles: an owned, mutable copy of one module's test tree.
//!
//! A handle starts unprepared. [`FixtureHandle::copy_to`] materialises the
//! copy; every structural operation before that fails with
//! [`HarnessError::NotPrepared`]. Operations that target a unit with no
//! matching block are no-ops and report zero edits.
//!
//! ```ignore
//! let mut fixture = FixtureHandle::new("nginx", DialectKind::TaskList, "roles/nginx");
//! fixture.copy_to("host/mnt/test")?;
//! fixture.duplicate_unit()?;
//! let command = fixture.invocation_command();
//! ```

use crate::dialect::{Dialect, DialectKind, UnitEdit, FIXTURE_MOUNT};
use crate::locator::{Document, Locator};
use crate::result::{HarnessError, HarnessResult};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Recursively collect regular files under `dir`, sorted
pub fn scan_files_recursive(dir: &Path, files: &mut Vec<PathBuf>) -> HarnessResult<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            scan_files_recursive(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

/// Copy a directory tree, creating `dest`
pub fn copy_tree(src: &Path, dest: &Path) -> HarnessResult<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            let _ = fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Single-quote `value` for a POSIX shell
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Rename entries below `dir` whose names contain `old`, children first.
fn rename_below(dir: &Path, old: &str, new: &str) -> HarnessResult<usize> {
    let mut renamed = 0;
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .map(|e| e.map(|e| e.path()))
        .collect::<Result<_, _>>()?;
    entries.sort();
    for path in entries {
        if path.is_dir() {
            renamed += rename_below(&path, old, new)?;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.contains(old) {
            let target = path.with_file_name(name.replace(old, new));
            fs::rename(&path, &target)?;
            renamed += 1;
        }
    }
    Ok(renamed)
}

/// Mutable copy of one fixture.
pub struct FixtureHandle {
    name: String,
    unit: String,
    source: PathBuf,
    dialect: Box<dyn Dialect>,
    remote_path: String,
    root: Option<PathBuf>,
    instance: Uuid,
}

impl std::fmt::Debug for FixtureHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixtureHandle")
            .field("name", &self.name)
            .field("unit", &self.unit)
            .field("dialect", &self.dialect.kind())
            .field("prepared", &self.is_prepared())
            .field("root", &self.root)
            .field("instance", &self.instance)
            .finish()
    }
}

impl FixtureHandle {
    /// Create an unprepared handle for the fixture at `source`
    #[must_use]
    pub fn new(name: impl Into<String>, kind: DialectKind, source: impl Into<PathBuf>) -> Self {
        let name = name.into();
        let source = source.into();
        let remote_path = format!("/{}", source.display().to_string().trim_start_matches('/'));
        Self {
            unit: name.clone(),
            name,
            source,
            dialect: kind.adapter(),
            remote_path,
            root: None,
            instance: Uuid::new_v4(),
        }
    }

    /// Set the unit under test (defaults to the fixture name)
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Set where the fixture lives inside the execution environment
    #[must_use]
    pub fn with_remote_path(mut self, remote_path: impl Into<String>) -> Self {
        self.remote_path = remote_path.into();
        self
    }

    /// Fixture name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unit under test
    #[must_use]
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Canonical source path
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Dialect adapter
    #[must_use]
    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// Path of the fixture inside the execution environment
    #[must_use]
    pub fn remote_path(&self) -> &str {
        &self.remote_path
    }

    /// Per-handle id, distinguishing repeated runs of one fixture in logs
    #[must_use]
    pub const fn instance_id(&self) -> Uuid {
        self.instance
    }

    /// Whether the copy has been materialised
    #[must_use]
    pub const fn is_prepared(&self) -> bool {
        self.root.is_some()
    }

    /// Root of the materialised copy
    pub fn root(&self, operation: &str) -> HarnessResult<&Path> {
        self.root
            .as_deref()
            .ok_or_else(|| HarnessError::not_prepared(&self.name, operation))
    }

    /// Materialise the fixture at `dest`, replacing anything already there
    pub fn copy_to(&mut self, dest: impl AsRef<Path>) -> HarnessResult<()> {
        let dest = dest.as_ref();
        if !self.source.is_dir() {
            return Err(HarnessError::config(format!(
                "fixture '{}' source {} is not a directory",
                self.name,
                self.source.display()
            )));
        }
        if dest.exists() {
            fs::remove_dir_all(dest)?;
        }
        copy_tree(&self.source, dest)?;
        tracing::debug!(
            fixture = %self.name,
            instance = %self.instance,
            dest = %dest.display(),
            "fixture materialised"
        );
        self.root = Some(dest.to_path_buf());
        Ok(())
    }

    /// Code documents of the copy, sorted
    pub fn documents(&self) -> HarnessResult<Vec<PathBuf>> {
        let root = self.root("documents")?;
        let mut files = Vec::new();
        scan_files_recursive(root, &mut files)?;
        let extension = self.dialect.code_extension();
        files.retain(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(extension))
        });
        files.sort();
        Ok(files)
    }

    /// Apply `edit` to every document, writing back the ones it changed.
    fn edit_documents<F>(&self, operation: &str, mut edit: F) -> HarnessResult<usize>
    where
        F: FnMut(&Locator<'_>, &mut Document) -> usize,
    {
        let locator = Locator::new(self.dialect.grammar());
        let mut total = 0;
        for path in self.documents_for(operation)? {
            let mut document = Document::parse(&fs::read_to_string(&path)?);
            let edits = edit(&locator, &mut document);
            if edits > 0 {
                fs::write(&path, document.to_text())?;
                total += edits;
            }
        }
        tracing::debug!(fixture = %self.name, operation, edits = total, "structural edit");
        Ok(total)
    }

    fn documents_for(&self, operation: &str) -> HarnessResult<Vec<PathBuf>> {
        let _ = self.root(operation)?;
        self.documents()
    }

    /// Insert `content` after every block of the unit under test
    pub fn insert_after_unit(&mut self, content: &str) -> HarnessResult<usize> {
        let unit = self.unit.clone();
        self.edit_documents("insert_after_unit", |locator, doc| {
            locator.insert_after(doc, &unit, content)
        })
    }

    /// Duplicate every block of the unit under test
    pub fn duplicate_unit(&mut self) -> HarnessResult<usize> {
        let unit = self.unit.clone();
        self.edit_documents("duplicate_unit", |locator, doc| {
            locator.duplicate_block(doc, &unit)
        })
    }

    /// Apply a dialect edit
    pub fn apply_unit_edit(&mut self, edit: &UnitEdit) -> HarnessResult<usize> {
        let unit = self.unit.clone();
        match edit {
            UnitEdit::SetupExport {
                script,
                name,
                value,
            } => {
                let path = self.root("set_environment_variable")?.join(script);
                let prefix = format!("export {name}=");
                let mut lines: Vec<String> = match fs::read_to_string(&path) {
                    Ok(text) => text
                        .lines()
                        .filter(|l| !l.starts_with(&prefix))
                        .map(str::to_string)
                        .collect(),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
                    Err(e) => return Err(e.into()),
                };
                lines.push(format!("{prefix}{}", shell_quote(value)));
                fs::write(&path, lines.join("\n") + "\n")?;
                Ok(1)
            }
            UnitEdit::Property(property) => {
                self.edit_documents("insert_property", |locator, doc| {
                    locator.insert_property(doc, &unit, property)
                })
            }
            UnitEdit::CallOption(option) => self.edit_documents("append_call_option", |locator, doc| {
                locator.rewrite_openings(doc, &unit, |line| {
                    crate::dialect::ManifestCall::append_option(line, option)
                })
            }),
        }
    }

    /// Declare an environment variable for the run
    pub fn set_environment_variable(&mut self, name: &str, value: &str) -> HarnessResult<usize> {
        let edit = self.dialect.environment_edit(name, value);
        self.apply_unit_edit(&edit)
    }

    /// Turn the unit under test into a dry run
    pub fn inject_dry_run(&mut self) -> HarnessResult<usize> {
        let edit = self.dialect.dry_run_edit();
        self.apply_unit_edit(&edit)
    }

    /// Values of `fields` inside the unit's blocks, across all documents
    pub fn field_values(&self, fields: &[String]) -> HarnessResult<BTreeSet<String>> {
        let locator = Locator::new(self.dialect.grammar());
        let mut values = BTreeSet::new();
        for path in self.documents_for("field_values")? {
            let document = Document::parse(&fs::read_to_string(&path)?);
            values.extend(locator.field_values(&document, &self.unit, fields));
        }
        Ok(values)
    }

    /// Replace every occurrence of `old` in code documents; returns files changed
    pub fn rewrite_literal(&mut self, old: &str, new: &str) -> HarnessResult<usize> {
        let documents = self.documents_for("rewrite_literal")?;
        if old.is_empty() {
            return Ok(0);
        }
        let mut changed = 0;
        for path in documents {
            let text = fs::read_to_string(&path)?;
            if text.contains(old) {
                fs::write(&path, text.replace(old, new))?;
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Rename every file and folder whose name contains `old`; returns entries renamed
    pub fn rename_everywhere(&mut self, old: &str, new: &str) -> HarnessResult<usize> {
        let root = self.root("rename_everywhere")?.to_path_buf();
        if old.is_empty() {
            return Ok(0);
        }
        rename_below(&root, old, new)
    }

    /// Copy `path` into the dialect's auxiliary directory; returns the copy
    pub fn add_auxiliary_file(&mut self, path: impl AsRef<Path>) -> HarnessResult<PathBuf> {
        let path = path.as_ref();
        let dir = self.auxiliary_area("add_auxiliary_file")?;
        let file_name = path.file_name().ok_or_else(|| {
            HarnessError::config(format!("auxiliary file {} has no name", path.display()))
        })?;
        let target = dir.join(file_name);
        let _ = fs::copy(path, &target)?;
        Ok(target)
    }

    /// Write `contents` as `file_name` into the auxiliary area
    pub fn write_auxiliary_file(&mut self, file_name: &str, contents: &str) -> HarnessResult<PathBuf> {
        let target = self.auxiliary_area("write_auxiliary_file")?.join(file_name);
        fs::write(&target, contents)?;
        Ok(target)
    }

    fn auxiliary_area(&self, operation: &str) -> HarnessResult<PathBuf> {
        let dir = self.root(operation)?.join(self.dialect.auxiliary_dir());
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Write the dialect's entry point next to the copy, if it has one
    pub fn write_entry_point(&self) -> HarnessResult<Option<PathBuf>> {
        let root = self.root("write_entry_point")?;
        let Some(entry) = self.dialect.entry_point(&self.remote_path) else {
            return Ok(None);
        };
        let dir = root.parent().unwrap_or(root);
        let path = dir.join(entry.file_name);
        fs::write(&path, entry.contents)?;
        Ok(Some(path))
    }

    /// Command the execution backend runs for this fixture
    #[must_use]
    pub fn invocation_command(&self) -> String {
        self.dialect.invocation_command(&self.remote_path)
    }

    /// Where the backend should mount the copy
    #[must_use]
    pub const fn mount_point() -> &'static str {
        FIXTURE_MOUNT
    }
}
