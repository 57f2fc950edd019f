//! Process descriptor parser for rendered control-text.
//!
//! The control format is line oriented. Each relevant line is first lexed
//! into a structured statement (process declaration, integrate clause,
//! simulate clause, or global event count), and a second pass associates
//! clauses with declarations by exact internal-name equality, never by
//! source order. `#` starts a comment that runs to end of line.
//!
//! A declared process name may carry one of four component suffixes
//! (`_BORN`, `_REAL`, `_VIRTUAL`, `_DGLAP`); a bare name is the implicit
//! born component. Every declared component must have a companion
//! `integrate (name)` clause; the `simulate (name)` clause is optional and
//! contributes the sample identifier and expected event count. A missing
//! per-component event count always resolves to an integer, falling back
//! to a global `n_events` declaration and finally to zero.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("process '{process}' component '{internal_name}' has no matching integrate clause")]
    MissingDeclaration {
        process: String,
        internal_name: String,
    },
    #[error("malformed {context} in control line '{line}'")]
    Parse { context: &'static str, line: String },
}

/// Perturbative component label; an opaque tag as far as the scan core is
/// concerned, but the set is fixed by the control format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    Born,
    Real,
    Virtual,
    Dglap,
}

impl Component {
    pub const ALL: [Component; 4] = [
        Component::Born,
        Component::Real,
        Component::Virtual,
        Component::Dglap,
    ];

    /// Split a declared name into base process name and component, driven
    /// by the fixed suffix set. A bare name is the born component.
    pub fn split_declared_name(name: &str) -> (&str, Component) {
        for component in Component::ALL {
            if let Some(base) = name.strip_suffix(component.suffix()) {
                if !base.is_empty() {
                    return (base, component);
                }
            }
        }
        (name, Component::Born)
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Component::Born => "_BORN",
            Component::Real => "_REAL",
            Component::Virtual => "_VIRTUAL",
            Component::Dglap => "_DGLAP",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Component::Born => "born",
            Component::Real => "real",
            Component::Virtual => "virtual",
            Component::Dglap => "dglap",
        }
    }

    /// Ordinal used in per-component grid file names (`<name>.m<k>.vg2`).
    pub fn grid_ordinal(self) -> u8 {
        match self {
            Component::Born => 1,
            Component::Real => 2,
            Component::Virtual => 3,
            Component::Dglap => 4,
        }
    }
}

/// Per-component metadata extracted from the control-text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentInfo {
    /// Declared name as written, used for clause association and for
    /// locating per-component output files.
    pub internal_name: String,
    /// Sum of the leading integers of the integrate clause's
    /// `iterations = n1:t1, n2:t2, ...` list.
    pub iterations: u64,
    /// Sample identifier from the simulate clause, when present.
    pub sample: Option<String>,
    /// Expected event count; always a resolved integer.
    pub expected_events: u64,
}

/// Base process name -> component -> extracted metadata.
pub type ProcessDescriptor = BTreeMap<String, BTreeMap<Component, ComponentInfo>>;

/// Structured intermediate representation of one relevant control line.
#[derive(Debug, Clone, PartialEq)]
enum Statement {
    ProcessDecl {
        internal_name: String,
    },
    Integrate {
        target: String,
        iterations: Vec<u64>,
    },
    Simulate {
        target: String,
        sample: Option<String>,
        events: Option<u64>,
    },
    GlobalEvents(u64),
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// Parse `(<name>)` directly after a clause keyword, returning the target
/// name and the rest of the line.
fn parse_paren_target<'a>(
    rest: &'a str,
    context: &'static str,
    line: &str,
) -> Result<(String, &'a str), DescriptorError> {
    let rest = rest.trim_start();
    let inner = rest
        .strip_prefix('(')
        .ok_or_else(|| DescriptorError::Parse {
            context,
            line: line.to_string(),
        })?;
    let close = inner.find(')').ok_or_else(|| DescriptorError::Parse {
        context,
        line: line.to_string(),
    })?;
    let target = inner[..close].trim().to_string();
    if target.is_empty() {
        return Err(DescriptorError::Parse {
            context,
            line: line.to_string(),
        });
    }
    Ok((target, &inner[close + 1..]))
}

/// Value of `key = <up to , } or end>` if the key appears in the text.
fn scan_assignment<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    let mut search = text;
    while let Some(idx) = search.find(key) {
        let after = &search[idx + key.len()..];
        let boundary_before = idx == 0
            || !search[..idx]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric() || c == '_');
        let after_trimmed = after.trim_start();
        if boundary_before {
            if let Some(value) = after_trimmed.strip_prefix('=') {
                let value = value.trim_start();
                let end = value
                    .find(|c| c == ',' || c == '}')
                    .unwrap_or(value.len());
                return Some(value[..end].trim());
            }
        }
        search = after;
    }
    None
}

fn parse_iteration_list(value: &str, line: &str) -> Result<Vec<u64>, DescriptorError> {
    let mut stages = Vec::new();
    for stage in value.split(',') {
        let stage = stage.trim();
        if stage.is_empty() {
            continue;
        }
        let leading = stage.split(':').next().unwrap_or_default().trim();
        let calls = leading
            .parse::<u64>()
            .map_err(|_| DescriptorError::Parse {
                context: "iteration syntax",
                line: line.to_string(),
            })?;
        stages.push(calls);
    }
    Ok(stages)
}

fn parse_quoted(value: &str) -> Option<String> {
    let inner = value.trim().strip_prefix('"')?;
    let close = inner.find('"')?;
    Some(inner[..close].to_string())
}

/// Lex the control-text into structured statements, skipping comments and
/// lines the descriptor does not care about.
fn scan_statements(text: &str) -> Result<Vec<Statement>, DescriptorError> {
    let mut statements = Vec::new();
    for raw_line in text.lines() {
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix("process") {
            if !rest.starts_with(char::is_whitespace) {
                continue;
            }
            let name: String = rest
                .trim_start()
                .chars()
                .take_while(|c| !c.is_whitespace() && *c != '=')
                .collect();
            if name.is_empty() {
                return Err(DescriptorError::Parse {
                    context: "process declaration",
                    line: raw_line.trim().to_string(),
                });
            }
            statements.push(Statement::ProcessDecl {
                internal_name: name,
            });
        } else if let Some(rest) = line.strip_prefix("integrate") {
            if !rest.trim_start().starts_with('(') {
                continue;
            }
            let (target, rest) = parse_paren_target(rest, "integrate clause", raw_line.trim())?;
            let iterations = match scan_assignment(rest, "iterations") {
                Some(value) => {
                    // Comma-separated stages escape the single-value cut in
                    // scan_assignment; re-scan from the raw remainder.
                    let full = rest
                        .split_once("iterations")
                        .and_then(|(_, tail)| tail.split_once('='))
                        .map(|(_, tail)| {
                            let tail = tail.trim_start();
                            let end = tail.find('}').unwrap_or(tail.len());
                            tail[..end].trim()
                        })
                        .unwrap_or(value);
                    parse_iteration_list(full, raw_line.trim())?
                }
                None => Vec::new(),
            };
            statements.push(Statement::Integrate { target, iterations });
        } else if let Some(rest) = line.strip_prefix("simulate") {
            if !rest.trim_start().starts_with('(') {
                continue;
            }
            let (target, rest) = parse_paren_target(rest, "simulate clause", raw_line.trim())?;
            let sample = scan_assignment(rest, "$sample").and_then(parse_quoted);
            let events = match scan_assignment(rest, "n_events") {
                Some(value) => Some(value.parse::<u64>().map_err(|_| DescriptorError::Parse {
                    context: "event count",
                    line: raw_line.trim().to_string(),
                })?),
                None => None,
            };
            statements.push(Statement::Simulate {
                target,
                sample,
                events,
            });
        } else if let Some(value) = scan_assignment(line, "n_events") {
            if line.starts_with("n_events") {
                let events = value.parse::<u64>().map_err(|_| DescriptorError::Parse {
                    context: "event count",
                    line: raw_line.trim().to_string(),
                })?;
                statements.push(Statement::GlobalEvents(events));
            }
        }
    }
    Ok(statements)
}

/// Parse rendered control-text into a process descriptor.
pub fn parse_descriptor(text: &str) -> Result<ProcessDescriptor, DescriptorError> {
    let statements = scan_statements(text)?;

    // Clause association is keyed on exact internal-name equality. The
    // first clause for a given name wins; a redeclared component (same
    // base and suffix) overrides the earlier declaration.
    let mut integrate_by_name: BTreeMap<String, Vec<u64>> = BTreeMap::new();
    let mut simulate_by_name: BTreeMap<String, (Option<String>, Option<u64>)> = BTreeMap::new();
    let mut declared: BTreeMap<String, BTreeMap<Component, String>> = BTreeMap::new();
    let mut global_events: Option<u64> = None;

    for statement in statements {
        match statement {
            Statement::ProcessDecl { internal_name } => {
                let (base, component) = Component::split_declared_name(&internal_name);
                declared
                    .entry(base.to_string())
                    .or_default()
                    .insert(component, internal_name);
            }
            Statement::Integrate { target, iterations } => {
                integrate_by_name.entry(target).or_insert(iterations);
            }
            Statement::Simulate {
                target,
                sample,
                events,
            } => {
                simulate_by_name.entry(target).or_insert((sample, events));
            }
            Statement::GlobalEvents(events) => {
                global_events = Some(events);
            }
        }
    }

    let mut descriptor = ProcessDescriptor::new();
    for (process, components) in declared {
        let mut infos = BTreeMap::new();
        for (component, internal_name) in components {
            let iterations = integrate_by_name.get(&internal_name).ok_or_else(|| {
                DescriptorError::MissingDeclaration {
                    process: process.clone(),
                    internal_name: internal_name.clone(),
                }
            })?;
            let (sample, events) = simulate_by_name
                .get(&internal_name)
                .cloned()
                .unwrap_or((None, None));
            infos.insert(
                component,
                ComponentInfo {
                    internal_name,
                    iterations: iterations.iter().sum(),
                    sample,
                    expected_events: events.or(global_events).unwrap_or(0),
                },
            );
        }
        descriptor.insert(process, infos);
    }
    Ok(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_declared_names_on_the_fixed_suffix_set() {
        assert_eq!(
            Component::split_declared_name("vbf_hh_REAL"),
            ("vbf_hh", Component::Real)
        );
        assert_eq!(
            Component::split_declared_name("vbf_hh"),
            ("vbf_hh", Component::Born)
        );
        assert_eq!(
            Component::split_declared_name("vbf_hh_DGLAP"),
            ("vbf_hh", Component::Dglap)
        );
    }

    #[test]
    fn parses_two_components_with_summed_iterations_and_samples() {
        let text = r#"
# rendered control file
process x_BORN = u, d => u, d, h
process x_REAL = u, d => u, d, h, g
integrate (x_BORN) { iterations = 10:1, 20:2 }
integrate (x_REAL) { iterations = 10:1, 20:2 }
simulate (x_BORN) { $sample = "x_born_events" }
simulate (x_REAL) { $sample = "x_real_events" }
"#;
        let descriptor = parse_descriptor(text).expect("descriptor should parse");
        let process = descriptor.get("x").expect("process x should be present");
        assert_eq!(process.len(), 2);

        let born = &process[&Component::Born];
        assert_eq!(born.internal_name, "x_BORN");
        assert_eq!(born.iterations, 30);
        assert_eq!(born.sample.as_deref(), Some("x_born_events"));

        let real = &process[&Component::Real];
        assert_eq!(real.internal_name, "x_REAL");
        assert_eq!(real.iterations, 30);
        assert_eq!(real.sample.as_deref(), Some("x_real_events"));
    }

    #[test]
    fn bare_declaration_is_the_default_component() {
        let text = r#"
process vbf = u, d => u, d, h, h
integrate (vbf) { iterations = 5:10000:"gw", 3:20000 }
"#;
        let descriptor = parse_descriptor(text).expect("descriptor should parse");
        let born = &descriptor["vbf"][&Component::Born];
        assert_eq!(born.internal_name, "vbf");
        assert_eq!(born.iterations, 8);
        assert_eq!(born.sample, None);
        assert_eq!(born.expected_events, 0);
    }

    #[test]
    fn association_is_by_name_not_source_order() {
        // Clauses precede the declarations they belong to.
        let text = r#"
integrate (x_REAL) { iterations = 2:100 }
simulate (x_REAL) { $sample = "real_events", n_events = 500 }
integrate (x) { iterations = 1:100 }
process x_REAL = a, b => c
process x = a, b => c
"#;
        let descriptor = parse_descriptor(text).expect("descriptor should parse");
        let process = &descriptor["x"];
        assert_eq!(process[&Component::Real].expected_events, 500);
        assert_eq!(process[&Component::Real].iterations, 2);
        assert_eq!(process[&Component::Born].iterations, 1);
    }

    #[test]
    fn event_count_falls_back_to_global_then_zero() {
        let text = r#"
n_events = 7500
process x = a => b
integrate (x) { iterations = 1:10 }
simulate (x) { $sample = "x_events" }
process y = a => b
integrate (y) { iterations = 1:10 }
"#;
        let descriptor = parse_descriptor(text).expect("descriptor should parse");
        assert_eq!(descriptor["x"][&Component::Born].expected_events, 7500);
        // No simulate clause at all still resolves to the global default.
        assert_eq!(descriptor["y"][&Component::Born].expected_events, 7500);

        let text = r#"
process x = a => b
integrate (x) { iterations = 1:10 }
simulate (x) { $sample = "x_events" }
"#;
        let descriptor = parse_descriptor(text).expect("descriptor should parse");
        assert_eq!(descriptor["x"][&Component::Born].expected_events, 0);
    }

    #[test]
    fn component_without_integrate_clause_is_missing_declaration() {
        let text = r#"
process x_BORN = a => b
process x_REAL = a => b
integrate (x_BORN) { iterations = 1:10 }
"#;
        let error = parse_descriptor(text).expect_err("descriptor should fail");
        assert_eq!(
            error,
            DescriptorError::MissingDeclaration {
                process: "x".to_string(),
                internal_name: "x_REAL".to_string(),
            }
        );
    }

    #[test]
    fn malformed_iteration_syntax_is_a_parse_error() {
        let text = r#"
process x = a => b
integrate (x) { iterations = ten:1 }
"#;
        let error = parse_descriptor(text).expect_err("descriptor should fail");
        assert!(matches!(
            error,
            DescriptorError::Parse {
                context: "iteration syntax",
                ..
            }
        ));
    }

    #[test]
    fn comments_and_unrelated_lines_are_ignored() {
        let text = r#"
# process commented_out = a => b
model = SM_HEFT
sqrts = 13600 GeV
process x = a => b  # trailing comment
integrate (x) { iterations = 4:20000 }
"#;
        let descriptor = parse_descriptor(text).expect("descriptor should parse");
        assert_eq!(descriptor.len(), 1);
        assert_eq!(descriptor["x"][&Component::Born].iterations, 4);
    }

    #[test]
    fn first_matching_clause_wins() {
        let text = r#"
process x = a => b
integrate (x) { iterations = 1:10 }
integrate (x) { iterations = 9:10 }
"#;
        let descriptor = parse_descriptor(text).expect("descriptor should parse");
        assert_eq!(descriptor["x"][&Component::Born].iterations, 1);
    }
}
