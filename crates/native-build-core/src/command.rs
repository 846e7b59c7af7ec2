//! `native-image` command-line construction
//!
//! Token order is fixed: executable, baseline flags, class-initialization
//! tracing, feature switches, valued settings, image name, classpath, and
//! finally the entry-point class. The same configuration and toolchain
//! version always produce the same tokens.

use crate::config::BuildConfiguration;
use crate::Result;
use graal_toolchain::{Platform, ToolchainLocation, VersionNumber};
use serde::Serialize;
use std::fmt;

/// First toolchain release that takes a class list for initialization tracing
pub const CLASS_LIST_TRACE_VERSION: &str = "20.3.0";

/// Launcher name of the compiler inside a toolchain `bin` directory
pub const NATIVE_IMAGE: &str = "native-image";

/// Flags present in every invocation
const BASELINE_FLAGS: [&str; 5] = [
    "--allow-incomplete-classpath",
    "--report-unsupported-elements-at-runtime",
    "--no-fallback",
    "--no-server",
    "--install-exit-handlers",
];

/// An ordered argument vector, program first
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CommandLine(Vec<String>);

impl CommandLine {
    pub fn program(&self) -> &str {
        self.0.first().map(String::as_str).unwrap_or_default()
    }

    pub fn args(&self) -> &[String] {
        self.0.get(1..).unwrap_or_default()
    }

    pub fn tokens(&self) -> &[String] {
        &self.0
    }

    pub fn contains(&self, token: &str) -> bool {
        self.0.iter().any(|t| t == token)
    }

    pub fn position(&self, token: &str) -> Option<usize> {
        self.0.iter().position(|t| t == token)
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl From<Vec<String>> for CommandLine {
    fn from(tokens: Vec<String>) -> Self {
        CommandLine(tokens)
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

/// Which class-initialization tracing syntax the toolchain understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassInitTraceSyntax {
    /// `-H:+TraceClassInitialization`, driven by a boolean
    Legacy,
    /// `-H:TraceClassInitialization=<classes>`, driven by a class list
    ClassList,
}

impl ClassInitTraceSyntax {
    pub fn for_version(version: &VersionNumber) -> Self {
        if *version < VersionNumber::new(CLASS_LIST_TRACE_VERSION) {
            ClassInitTraceSyntax::Legacy
        } else {
            ClassInitTraceSyntax::ClassList
        }
    }

    fn flag(&self, config: &BuildConfiguration) -> Option<String> {
        match self {
            ClassInitTraceSyntax::Legacy => (config.trace_class_initialization == Some(true))
                .then(|| "-H:+TraceClassInitialization".to_string()),
            ClassInitTraceSyntax::ClassList => join_list(&config.trace_class_initialization_for)
                .map(|classes| format!("-H:TraceClassInitialization={classes}")),
        }
    }
}

/// One optional flag and the setting that controls it
enum FlagRule {
    /// Emitted verbatim when the setting is explicitly `true`
    Switch(&'static str, fn(&BuildConfiguration) -> Option<bool>),
    /// Emitted as prefix + value when the setting yields a value
    Valued(&'static str, fn(&BuildConfiguration) -> Option<String>),
}

impl FlagRule {
    fn render(&self, config: &BuildConfiguration) -> Option<String> {
        match self {
            FlagRule::Switch(flag, setting) => (setting(config) == Some(true)).then(|| flag.to_string()),
            FlagRule::Valued(prefix, setting) => setting(config).map(|value| format!("{prefix}{value}")),
        }
    }
}

const FLAG_RULES: &[FlagRule] = &[
    FlagRule::Switch("-H:+RemoveSaturatedTypeFlows", |c| c.remove_saturated_type_flows),
    FlagRule::Switch("-H:+ReportExceptionStackTraces", |c| c.report_exception_stack_traces),
    FlagRule::Switch("-H:+PrintAnalysisCallTree", |c| c.print_analysis_call_tree),
    FlagRule::Switch("-H:-CheckToolchain", |c| c.disable_toolchain_checking),
    FlagRule::Switch("--enable-all-security-services", |c| c.enable_all_security_services),
    FlagRule::Switch("--enable-http", |c| c.enable_http),
    FlagRule::Switch("--enable-https", |c| c.enable_https),
    FlagRule::Switch("--static", |c| c.statically_linked),
    FlagRule::Switch("--verbose", |c| c.verbose),
    FlagRule::Switch("-Dspring.native.missing-selector-hints=warning", |c| c.warn_missing_selector_hints),
    FlagRule::Switch("-Dspring.native.remove-unused-autoconfig=true", |c| c.remove_unused_autoconfig),
    FlagRule::Valued("--enable-url-protocols=", |c| join_list(&c.enable_url_protocols)),
    FlagRule::Valued("-Dspring.native.remove-yaml-support=", |c| literal(c.remove_yaml_support)),
    FlagRule::Valued("-Dspring.native.remove-xml-support=", |c| literal(c.remove_xml_support)),
    FlagRule::Valued("-Dspring.native.remove-spel-support=", |c| literal(c.remove_spel_support)),
    FlagRule::Valued("-Dspring.native.remove-jmx-support=", |c| literal(c.remove_jmx_support)),
    FlagRule::Valued("-Dspring.native.verify=", |c| literal(c.verify)),
    FlagRule::Valued("-Dspring.native.verbose=", |c| literal(c.spring_native_verbose)),
    FlagRule::Valued("-Dspring.native.mode=", |c| Some(c.mode().as_str().to_string())),
    FlagRule::Valued("-Dspring.native.dump-config=", |c| non_empty(c.dump_config.as_deref())),
    FlagRule::Valued("-J-Xmx", |c| non_empty(c.max_heap_size.as_deref())),
    FlagRule::Valued("--initialize-at-build-time=", |c| join_list(&c.initialize_at_build_time)),
];

fn literal(value: Option<bool>) -> Option<String> {
    value.map(|v| v.to_string())
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

fn join_list(values: &[String]) -> Option<String> {
    (!values.is_empty()).then(|| values.join(","))
}

/// Builds `native-image` invocations for one configuration and toolchain
pub struct BuildCommandBuilder<'a> {
    config: &'a BuildConfiguration,
    syntax: ClassInitTraceSyntax,
    executable: String,
}

impl<'a> BuildCommandBuilder<'a> {
    pub fn new(
        config: &'a BuildConfiguration,
        version: &VersionNumber,
        location: &ToolchainLocation,
        platform: &Platform,
    ) -> Self {
        BuildCommandBuilder {
            config,
            syntax: ClassInitTraceSyntax::for_version(version),
            executable: location
                .launcher(platform, NATIVE_IMAGE)
                .to_string_lossy()
                .into_owned(),
        }
    }

    pub fn syntax(&self) -> ClassInitTraceSyntax {
        self.syntax
    }

    /// Assemble the full argument vector
    ///
    /// # TDD: test_tokens_follow_fixed_order
    pub fn build(&self, project_name: &str, class_path: &str) -> Result<CommandLine> {
        let main_class = self.config.require_main_class()?;

        let mut tokens = vec![self.executable.clone()];
        tokens.extend(BASELINE_FLAGS.iter().map(|f| f.to_string()));
        tokens.extend(self.syntax.flag(self.config));
        tokens.extend(FLAG_RULES.iter().filter_map(|rule| rule.render(self.config)));
        tokens.push(format!("-H:Name={project_name}"));
        tokens.push("-cp".to_string());
        tokens.push(class_path.to_string());
        tokens.push(main_class.to_string());

        Ok(CommandLine(tokens))
    }
}
