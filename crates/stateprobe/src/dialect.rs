//! Dialect adapters: task lists (Ansible roles) and manifest calls (Puppet acceptance specs).
//!
//! A dialect supplies the block grammar used by the [`Locator`](crate::locator::Locator)
//! and describes, as plain data, how environment variables, dry-run flags and
//! capture hooks are injected into a fixture. The fixture handle applies
//! those descriptions; dialects never touch the file system.

use crate::locator::{strip_quotes, BlockGrammar};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Where fixtures are mounted inside the execution environment.
pub const FIXTURE_MOUNT: &str = "/mnt/test";

/// Where the capture hook writes snapshot records inside the environment.
pub const SNAPSHOT_MOUNT: &str = "/mnt/snapshots";

static YAML_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:-\s+)?([A-Za-z_][A-Za-z0-9_.-]*)\s*:\s*(.*?)\s*$")
        .expect("valid task field pattern")
});

static ARROW_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_][A-Za-z0-9_]*)\s*=>\s*(?:'([^']*)'|"([^"]*)"|([^\s,'"}\)]+))"#)
        .expect("valid manifest field pattern")
});

/// Dialect tag used in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialectKind {
    /// Declarative task lists
    #[serde(alias = "ansible")]
    TaskList,
    /// Imperative manifest specs
    #[serde(alias = "puppet")]
    ManifestCall,
}

impl DialectKind {
    /// Build the adapter for this dialect
    #[must_use]
    pub fn adapter(self) -> Box<dyn Dialect> {
        match self {
            Self::TaskList => Box::new(TaskList),
            Self::ManifestCall => Box::new(ManifestCall),
        }
    }

    /// Configuration name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TaskList => "task_list",
            Self::ManifestCall => "manifest_call",
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An edit applied to a fixture on a dialect's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitEdit {
    /// Write `export name=value` to a setup script sourced before invocation
    SetupExport {
        /// Script path relative to the fixture root
        script: &'static str,
        /// Variable name
        name: String,
        /// Variable value
        value: String,
    },
    /// Add a property line as the first line inside every unit block
    Property(String),
    /// Append an option to the argument list of every unit call
    CallOption(String),
}

/// Generated document that runs the fixture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    /// File name, written next to the fixture copy
    pub file_name: &'static str,
    /// File contents
    pub contents: String,
}

/// Capability set of a fixture dialect.
pub trait Dialect: BlockGrammar + fmt::Debug + Send + Sync {
    /// Dialect tag
    fn kind(&self) -> DialectKind;

    /// Block grammar handed to the locator
    fn grammar(&self) -> &dyn BlockGrammar;

    /// Suffix of files holding blocks
    fn code_extension(&self) -> &'static str;

    /// Directory (relative to the fixture root) for auxiliary files
    fn auxiliary_dir(&self) -> &'static str;

    /// Edit that sets an environment variable for the run
    fn environment_edit(&self, name: &str, value: &str) -> UnitEdit;

    /// Edit that turns the unit into a dry run
    fn dry_run_edit(&self) -> UnitEdit;

    /// Content inserted after the unit to run the capture hook
    ///
    /// `settings` names a capture settings file in the auxiliary area; the
    /// hook receives its location as `--config`.
    fn capture_invocation(&self, script: &str, settings: Option<&str>, args: &str) -> String;

    /// Templated-path marker removed by `remove_remote_dir`
    fn remote_dir_marker(&self) -> &'static str;

    /// Entry-point document, if the runner needs one
    fn entry_point(&self, remote_path: &str) -> Option<EntryPoint>;

    /// Command the execution backend runs
    fn invocation_command(&self, remote_path: &str) -> String;

    /// Log substring present iff no task failed
    fn success_marker(&self) -> &'static str;

    /// Whether running the fixture starts a second environment
    fn spawns_secondary_environment(&self) -> bool;
}

// =============================================================================
// Task lists
// =============================================================================

/// Ansible-style task lists: `- name: X` blocks with `key: value` fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskList;

impl TaskList {
    /// Opening marker of a named task
    pub const STEP_MARKER: &'static str = "- name:";
    /// Setup script sourced before the runner
    pub const SETUP_SCRIPT: &'static str = "env_setup.sh";
}

impl BlockGrammar for TaskList {
    fn block_identity(&self, trimmed: &str) -> Option<String> {
        let rest = trimmed.strip_prefix(Self::STEP_MARKER)?;
        let name = strip_quotes(rest);
        (!name.is_empty()).then(|| name.to_string())
    }

    fn field_assignment(&self, line: &str, fields: &[String]) -> Option<String> {
        let caps = YAML_FIELD.captures(line)?;
        let key = caps.get(1)?.as_str();
        fields.iter().find(|f| f.as_str() == key)?;
        let value = strip_quotes(caps.get(2)?.as_str());
        (!value.is_empty()).then(|| value.to_string())
    }

    fn template_markers(&self) -> &'static [&'static str] {
        &["{{", "}}"]
    }
}

impl Dialect for TaskList {
    fn kind(&self) -> DialectKind {
        DialectKind::TaskList
    }

    fn grammar(&self) -> &dyn BlockGrammar {
        self
    }

    fn code_extension(&self) -> &'static str {
        ".yml"
    }

    fn auxiliary_dir(&self) -> &'static str {
        "files"
    }

    fn environment_edit(&self, name: &str, value: &str) -> UnitEdit {
        UnitEdit::SetupExport {
            script: Self::SETUP_SCRIPT,
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    fn dry_run_edit(&self) -> UnitEdit {
        UnitEdit::Property("check_mode: true".to_string())
    }

    fn capture_invocation(&self, script: &str, settings: Option<&str>, args: &str) -> String {
        let config = settings
            .map(|file| format!(" --config {FIXTURE_MOUNT}/{}/{file}", self.auxiliary_dir()))
            .unwrap_or_default();
        format!("- name: stateprobe capture\n  script: {script} {args}{config}\n")
    }

    fn remote_dir_marker(&self) -> &'static str {
        "{{ remote_tmp_dir }}/"
    }

    fn entry_point(&self, remote_path: &str) -> Option<EntryPoint> {
        Some(EntryPoint {
            file_name: "playbook.yml",
            contents: format!(
                "---\n- hosts: test_target\n  roles:\n    - role: '{remote_path}'\n"
            ),
        })
    }

    fn invocation_command(&self, _remote_path: &str) -> String {
        let script = format!("{FIXTURE_MOUNT}/{}", Self::SETUP_SCRIPT);
        format!(
            "bash -c \"if [ -f {script} ]; then source {script}; fi; ansible-playbook /mnt/playbook.yml\""
        )
    }

    fn success_marker(&self) -> &'static str {
        "failed=0"
    }

    fn spawns_secondary_environment(&self) -> bool {
        false
    }
}

// =============================================================================
// Manifest calls
// =============================================================================

/// Puppet acceptance specs: single-line `apply_manifest(...)` calls with
/// `key => 'value'` fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestCall;

/// Byte offsets of a call on one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallBounds {
    /// Offset of the call marker
    pub marker: usize,
    /// Offset of the opening parenthesis
    pub open: usize,
    /// Offset of the matching closing parenthesis
    pub close: usize,
    /// Whether the call is the `_on` variant taking a host first
    pub on_host: bool,
}

impl CallBounds {
    /// Argument text between the parentheses
    #[must_use]
    pub fn arguments<'a>(&self, line: &'a str) -> &'a str {
        &line[self.open + 1..self.close]
    }
}

impl ManifestCall {
    /// Call markers that open a block
    pub const CALL_MARKERS: [&'static str; 2] = ["apply_manifest_on(", "apply_manifest("];

    /// Locate the first manifest call on `line` whose parentheses close on the same line
    #[must_use]
    pub fn call_bounds(line: &str) -> Option<CallBounds> {
        let (marker, on_host) = Self::CALL_MARKERS
            .iter()
            .filter_map(|m| line.find(m).map(|at| (at, *m == Self::CALL_MARKERS[0])))
            .min_by_key(|(at, _)| *at)?;
        let open = line[marker..].find('(')? + marker;

        let mut depth = 0usize;
        let mut quote: Option<char> = None;
        for (offset, c) in line[open..].char_indices() {
            match (quote, c) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '\'' | '"') => quote = Some(c),
                (None, '(') => depth += 1,
                (None, ')') => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(CallBounds {
                            marker,
                            open,
                            close: open + offset,
                            on_host,
                        });
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Split an argument list at top-level commas
    #[must_use]
    pub fn split_arguments(arguments: &str) -> Vec<&str> {
        let mut parts = Vec::new();
        let mut depth = 0i32;
        let mut quote: Option<char> = None;
        let mut begin = 0;
        for (offset, c) in arguments.char_indices() {
            match (quote, c) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '\'' | '"') => quote = Some(c),
                (None, '(' | '{' | '[') => depth += 1,
                (None, ')' | '}' | ']') => depth -= 1,
                (None, ',') if depth == 0 => {
                    parts.push(arguments[begin..offset].trim());
                    begin = offset + 1;
                }
                _ => {}
            }
        }
        let last = arguments[begin..].trim();
        if !last.is_empty() {
            parts.push(last);
        }
        parts
    }

    /// Append `option` to the argument list of the call on `line`
    #[must_use]
    pub fn append_option(line: &str, option: &str) -> Option<String> {
        let bounds = Self::call_bounds(line)?;
        let separator = if bounds.arguments(line).trim().is_empty() {
            ""
        } else {
            ", "
        };
        Some(format!(
            "{}{separator}{option}{}",
            &line[..bounds.close],
            &line[bounds.close..]
        ))
    }
}

impl BlockGrammar for ManifestCall {
    /// The call's subject: the manifest argument (second for `_on` calls).
    fn block_identity(&self, trimmed: &str) -> Option<String> {
        let bounds = Self::call_bounds(trimmed)?;
        let arguments = Self::split_arguments(bounds.arguments(trimmed));
        let subject = arguments.get(usize::from(bounds.on_host))?;
        let subject = strip_quotes(subject);
        (!subject.is_empty()).then(|| subject.to_string())
    }

    fn single_line_blocks(&self) -> bool {
        true
    }

    fn field_assignment(&self, line: &str, fields: &[String]) -> Option<String> {
        let assignments: Vec<(&str, &str)> = ARROW_FIELD
            .captures_iter(line)
            .filter_map(|caps| {
                let key = caps.get(1)?.as_str();
                let value = caps
                    .get(2)
                    .or_else(|| caps.get(3))
                    .or_else(|| caps.get(4))?
                    .as_str();
                Some((key, value))
            })
            .collect();
        fields.iter().find_map(|field| {
            assignments
                .iter()
                .find(|(key, _)| key == field)
                .map(|(_, value)| (*value).to_string())
        })
    }

    fn template_markers(&self) -> &'static [&'static str] {
        &["${", "#{"]
    }
}

impl Dialect for ManifestCall {
    fn kind(&self) -> DialectKind {
        DialectKind::ManifestCall
    }

    fn grammar(&self) -> &dyn BlockGrammar {
        self
    }

    fn code_extension(&self) -> &'static str {
        ".rb"
    }

    fn auxiliary_dir(&self) -> &'static str {
        "spec/fixtures/files"
    }

    fn environment_edit(&self, name: &str, value: &str) -> UnitEdit {
        let value = value.replace('\\', r"\\").replace('\'', r"\'");
        UnitEdit::CallOption(format!("environment: {{ '{name}' => '{value}' }}"))
    }

    fn dry_run_edit(&self) -> UnitEdit {
        UnitEdit::CallOption("noop: true".to_string())
    }

    fn capture_invocation(&self, script: &str, settings: Option<&str>, args: &str) -> String {
        let dir = self.auxiliary_dir();
        let mut out = format!("scp_to(default, '{dir}/{script}', '/tmp/{script}')\n");
        let mut config = String::new();
        if let Some(file) = settings {
            out += &format!("scp_to(default, '{dir}/{file}', '/tmp/{file}')\n");
            config = format!(" --config /tmp/{file}");
        }
        out += &format!("shell('chmod +x /tmp/{script} && /tmp/{script} {args}{config}')\n");
        out
    }

    fn remote_dir_marker(&self) -> &'static str {
        "#{remote_tmp_dir}/"
    }

    fn entry_point(&self, _remote_path: &str) -> Option<EntryPoint> {
        None
    }

    fn invocation_command(&self, remote_path: &str) -> String {
        format!("bash -c \"cd {remote_path} && bundle install && bundle exec rake beaker\"")
    }

    fn success_marker(&self) -> &'static str {
        " 0 failures"
    }

    fn spawns_secondary_environment(&self) -> bool {
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::locator::{Document, Locator};

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_kind_round_trip() {
        assert_eq!(DialectKind::TaskList.adapter().kind(), DialectKind::TaskList);
        assert_eq!(
            DialectKind::ManifestCall.adapter().kind(),
            DialectKind::ManifestCall
        );
        assert_eq!(DialectKind::TaskList.to_string(), "task_list");
    }

    #[test]
    fn test_kind_aliases() {
        let kind: DialectKind = serde_yaml_ng::from_str("ansible").unwrap();
        assert_eq!(kind, DialectKind::TaskList);
        let kind: DialectKind = serde_yaml_ng::from_str("puppet").unwrap();
        assert_eq!(kind, DialectKind::ManifestCall);
        let kind: DialectKind = serde_yaml_ng::from_str("manifest_call").unwrap();
        assert_eq!(kind, DialectKind::ManifestCall);
    }

    #[test]
    fn test_task_identity() {
        assert_eq!(TaskList.block_identity("- name: install"), Some("install".into()));
        assert_eq!(
            TaskList.block_identity("- name: \"install pkg\""),
            Some("install pkg".into())
        );
        assert_eq!(TaskList.block_identity("name: install"), None);
        assert_eq!(TaskList.block_identity("- name:"), None);
    }

    #[test]
    fn test_task_field_assignment_first_match() {
        let line = "    dest: '/etc/app/cfg.yml'";
        assert_eq!(
            TaskList.field_assignment(line, &fields(&["src", "dest"])),
            Some("/etc/app/cfg.yml".into())
        );
        assert_eq!(TaskList.field_assignment(line, &fields(&["src"])), None);
        assert_eq!(TaskList.field_assignment("  copy:", &fields(&["copy"])), None);
        assert_eq!(
            TaskList.field_assignment("- path: /x", &fields(&["path"])),
            Some("/x".into())
        );
    }

    #[test]
    fn test_task_scenario_install_path() {
        let doc = Document::parse("- name: install\n  copy:\n    path: /etc/app/cfg.yml\n");
        let values = Locator::new(&TaskList).field_values(&doc, "install", &fields(&["path"]));
        assert_eq!(values.into_iter().collect::<Vec<_>>(), ["/etc/app/cfg.yml"]);
    }

    #[test]
    fn test_task_candidates() {
        assert!(TaskList.is_mutation_candidate("cfg.yml"));
        assert!(!TaskList.is_mutation_candidate("{{ remote_tmp_dir }}/cfg.yml"));
    }

    #[test]
    fn test_task_entry_point_and_command() {
        let entry = TaskList.entry_point("/etc/ansible/roles/nginx").unwrap();
        assert_eq!(entry.file_name, "playbook.yml");
        assert!(entry.contents.contains("role: '/etc/ansible/roles/nginx'"));
        let command = TaskList.invocation_command("/etc/ansible/roles/nginx");
        assert!(command.contains("source /mnt/test/env_setup.sh"));
        assert!(command.contains("ansible-playbook /mnt/playbook.yml"));
        assert!(!TaskList.spawns_secondary_environment());
        assert_eq!(TaskList.success_marker(), "failed=0");
    }

    #[test]
    fn test_call_bounds() {
        let line = "apply_manifest(pp, catch_failures: true)";
        let bounds = ManifestCall::call_bounds(line).unwrap();
        assert_eq!(bounds.arguments(line), "pp, catch_failures: true");
        assert!(!bounds.on_host);

        let line = "apply_manifest_on(host, \"class { 'nginx': }\")";
        let bounds = ManifestCall::call_bounds(line).unwrap();
        assert!(bounds.on_host);
        assert_eq!(bounds.close, line.len() - 1);
    }

    #[test]
    fn test_call_must_close_on_same_line() {
        assert!(ManifestCall::call_bounds("apply_manifest(<<-EOS").is_none());
        assert!(ManifestCall.block_identity("apply_manifest(pp,").is_none());
        assert!(ManifestCall.block_identity("shell('ls')").is_none());
    }

    #[test]
    fn test_call_parens_inside_quotes() {
        let line = "apply_manifest('notify { \"a)\": }')";
        let bounds = ManifestCall::call_bounds(line).unwrap();
        assert_eq!(bounds.close, line.len() - 1);
    }

    #[test]
    fn test_manifest_identity() {
        assert_eq!(
            ManifestCall.block_identity("apply_manifest(pp, catch_failures: true)"),
            Some("pp".into())
        );
        assert_eq!(
            ManifestCall.block_identity("apply_manifest_on(agent, 'include nginx')"),
            Some("include nginx".into())
        );
        assert_eq!(
            ManifestCall.block_identity("expect(apply_manifest(pp).exit_code).to eq(0)"),
            Some("pp".into())
        );
    }

    #[test]
    fn test_split_arguments() {
        assert_eq!(
            ManifestCall::split_arguments("pp, catch_failures: true"),
            vec!["pp", "catch_failures: true"]
        );
        assert_eq!(
            ManifestCall::split_arguments("'a, b', { x => 1, y => 2 }"),
            vec!["'a, b'", "{ x => 1, y => 2 }"]
        );
        assert!(ManifestCall::split_arguments("").is_empty());
    }

    #[test]
    fn test_append_option() {
        assert_eq!(
            ManifestCall::append_option("  apply_manifest(pp)", "noop: true").unwrap(),
            "  apply_manifest(pp, noop: true)"
        );
        assert_eq!(
            ManifestCall::append_option("apply_manifest()", "noop: true").unwrap(),
            "apply_manifest(noop: true)"
        );
        assert!(ManifestCall::append_option("puts 1", "noop: true").is_none());
    }

    #[test]
    fn test_manifest_fields() {
        let line = "apply_manifest(\"file { 'x': path => '/etc/app/cfg.yml', mode => \\\"0644\\\" }\")";
        assert_eq!(
            ManifestCall.field_assignment(line, &fields(&["owner", "path"])),
            Some("/etc/app/cfg.yml".into())
        );
        assert_eq!(
            ManifestCall.field_assignment("ensure => present,", &fields(&["ensure"])),
            Some("present".into())
        );
        assert_eq!(ManifestCall.field_assignment("x => 'y'", &fields(&["z"])), None);
    }

    #[test]
    fn test_manifest_single_line_blocks() {
        let text = "it 'works' do\n  apply_manifest(pp, catch_failures: true)\n  apply_manifest(pp, catch_changes: true)\nend\n";
        let doc = Document::parse(text);
        let spans = Locator::new(&ManifestCall).spans(&doc, "pp");
        assert_eq!(spans.len(), 2);
        assert!(spans.iter().all(|s| s.start == s.end));
    }

    #[test]
    fn test_manifest_edits() {
        assert_eq!(
            ManifestCall.environment_edit("LC_ALL", "fr_FR.UTF-8"),
            UnitEdit::CallOption("environment: { 'LC_ALL' => 'fr_FR.UTF-8' }".into())
        );
        assert_eq!(
            ManifestCall.environment_edit("GREETING", "it's"),
            UnitEdit::CallOption(r"environment: { 'GREETING' => 'it\'s' }".into())
        );
        assert_eq!(
            ManifestCall.dry_run_edit(),
            UnitEdit::CallOption("noop: true".into())
        );
        assert!(ManifestCall.spawns_secondary_environment());
        assert!(ManifestCall.entry_point("/x").is_none());
        assert!(ManifestCall
            .invocation_command("/etc/puppetlabs/code/modules/nginx")
            .contains("bundle install && bundle exec rake beaker"));
    }

    #[test]
    fn test_capture_invocation_shapes() {
        let task = TaskList.capture_invocation("hook", None, "capture --out /mnt/snapshots");
        assert!(task.starts_with("- name: stateprobe capture\n"));
        assert!(task.contains("script: hook capture --out /mnt/snapshots\n"));
        let call = ManifestCall.capture_invocation("hook", None, "capture");
        assert!(call.contains("scp_to(default, 'spec/fixtures/files/hook', '/tmp/hook')"));
        assert!(!call.contains("apply_manifest"));
    }

    #[test]
    fn test_capture_invocation_with_settings() {
        let task = TaskList.capture_invocation("hook", Some("capture.json"), "capture");
        assert!(task.contains("script: hook capture --config /mnt/test/files/capture.json\n"));
        let call = ManifestCall.capture_invocation("hook", Some("capture.json"), "capture");
        assert!(call.contains(
            "scp_to(default, 'spec/fixtures/files/capture.json', '/tmp/capture.json')"
        ));
        assert!(call.contains("/tmp/hook capture --config /tmp/capture.json')"));
    }
}
