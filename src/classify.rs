//! Semantic Mutation Classifier.
//!
//! Maps a `(before, after)` file-content pair to a set of
//! [`MutationClass`] tags by diffing the two contents as *sets of trimmed
//! lines* and matching each added or removed line against a fixed pattern
//! table. The classifier is intentionally structural — it never parses a
//! source grammar — which keeps it language-tolerant, cheap, and robust
//! against formatter churn, at the cost of being approximate.
//!
//! # Algorithm
//!
//! 1. Split each input on newlines, trim, drop empty lines; collect the
//!    *added* set (in `after`, not `before`) and the *removed* set.
//! 2. Match every line in each set against the pattern table; a hit
//!    records its category with add or delete polarity.
//! 3. Collapse symmetric add/delete pairs into the modify form for the
//!    categories that have one (function, class, import, type).
//! 4. If nothing matched but either set is non-empty, emit
//!    [`MutationClass::RefactorBlock`].

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Closed set of structural mutation tags recorded in the trace ledger.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MutationClass {
    AddFunction,
    ModifyFunction,
    DeleteFunction,
    AddClass,
    ModifyClass,
    DeleteClass,
    AddImport,
    ModifyImport,
    DeleteImport,
    AddExport,
    DeleteExport,
    AddType,
    ModifyType,
    RefactorBlock,
}

impl MutationClass {
    /// Returns the wire string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationClass::AddFunction => "ADD_FUNCTION",
            MutationClass::ModifyFunction => "MODIFY_FUNCTION",
            MutationClass::DeleteFunction => "DELETE_FUNCTION",
            MutationClass::AddClass => "ADD_CLASS",
            MutationClass::ModifyClass => "MODIFY_CLASS",
            MutationClass::DeleteClass => "DELETE_CLASS",
            MutationClass::AddImport => "ADD_IMPORT",
            MutationClass::ModifyImport => "MODIFY_IMPORT",
            MutationClass::DeleteImport => "DELETE_IMPORT",
            MutationClass::AddExport => "ADD_EXPORT",
            MutationClass::DeleteExport => "DELETE_EXPORT",
            MutationClass::AddType => "ADD_TYPE",
            MutationClass::ModifyType => "MODIFY_TYPE",
            MutationClass::RefactorBlock => "REFACTOR_BLOCK",
        }
    }
}

impl fmt::Display for MutationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MutationClass {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ADD_FUNCTION" => Ok(MutationClass::AddFunction),
            "MODIFY_FUNCTION" => Ok(MutationClass::ModifyFunction),
            "DELETE_FUNCTION" => Ok(MutationClass::DeleteFunction),
            "ADD_CLASS" => Ok(MutationClass::AddClass),
            "MODIFY_CLASS" => Ok(MutationClass::ModifyClass),
            "DELETE_CLASS" => Ok(MutationClass::DeleteClass),
            "ADD_IMPORT" => Ok(MutationClass::AddImport),
            "MODIFY_IMPORT" => Ok(MutationClass::ModifyImport),
            "DELETE_IMPORT" => Ok(MutationClass::DeleteImport),
            "ADD_EXPORT" => Ok(MutationClass::AddExport),
            "DELETE_EXPORT" => Ok(MutationClass::DeleteExport),
            "ADD_TYPE" => Ok(MutationClass::AddType),
            "MODIFY_TYPE" => Ok(MutationClass::ModifyType),
            "REFACTOR_BLOCK" => Ok(MutationClass::RefactorBlock),
            _ => Err(format!("Invalid mutation class: {}", value)),
        }
    }
}

/// Structural category a pattern belongs to. Categories, not tags, are
/// recorded while scanning so the collapse step can pair polarities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Category {
    Function,
    Class,
    Import,
    Export,
    Type,
}

/// `function NAME(...)` declaration, with optional `export` / `async`.
static RE_FUNCTION_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:export\s+)?(?:async\s+)?function\s+[A-Za-z_$][\w$]*\s*\(").unwrap()
});

/// `const NAME = (...) =>` arrow binding, with optional `export` / `async`.
static RE_ARROW_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:export\s+)?(?:const|let)\s+[A-Za-z_$][\w$]*\s*=\s*(?:async\s+)?\([^)]*\)\s*=>")
        .unwrap()
});

/// `NAME(...): TYPE` method signature, with optional `async`.
static RE_METHOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:async\s+)?([A-Za-z_$][\w$]*)\s*\([^)]*\)\s*:\s*[A-Za-z_$]").unwrap()
});

/// Keywords the method pattern must not mistake for a name.
const NON_METHOD_KEYWORDS: [&str; 6] = ["if", "for", "while", "switch", "catch", "return"];

/// `class NAME`, with optional `export`.
static RE_CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:export\s+)?class\s+[A-Za-z_$][\w$]*").unwrap());

/// `import ... from "..."`.
static RE_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*import\s+.*\bfrom\s+["']"#).unwrap());

/// `export default|type|const|function|class ...`.
static RE_EXPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*export\s+(?:default|type|const|function|class)\b").unwrap());

/// `type NAME = ...` alias, with optional `export`.
static RE_TYPE_ALIAS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:export\s+)?type\s+[A-Za-z_$][\w$]*\s*=").unwrap());

/// `interface NAME`, with optional `export`.
static RE_INTERFACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:export\s+)?interface\s+[A-Za-z_$][\w$]*").unwrap());

/// Categories matched by one trimmed line. A single line may hit several
/// patterns (`export function f()` is both a function and an export).
fn categories_for(line: &str) -> BTreeSet<Category> {
    let mut hits = BTreeSet::new();

    if RE_FUNCTION_DECL.is_match(line) || RE_ARROW_FUNCTION.is_match(line) {
        hits.insert(Category::Function);
    } else if let Some(captures) = RE_METHOD.captures(line) {
        // The regex crate has no lookaround; reject control-flow keywords here.
        let name = &captures[1];
        if !NON_METHOD_KEYWORDS.contains(&name) {
            hits.insert(Category::Function);
        }
    }
    if RE_CLASS.is_match(line) {
        hits.insert(Category::Class);
    }
    if RE_IMPORT.is_match(line) {
        hits.insert(Category::Import);
    }
    if RE_EXPORT.is_match(line) {
        hits.insert(Category::Export);
    }
    if RE_TYPE_ALIAS.is_match(line) || RE_INTERFACE.is_match(line) {
        hits.insert(Category::Type);
    }

    hits
}

fn line_set(content: &str) -> BTreeSet<&str> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

/// Classify the structural difference between two file contents.
///
/// Deterministic, closed over [`MutationClass`], and order-insensitive:
/// `classify(x, x)` is empty, and a non-empty diff that matches no
/// pattern yields `{REFACTOR_BLOCK}`.
pub fn classify(before: &str, after: &str) -> BTreeSet<MutationClass> {
    let before_lines = line_set(before);
    let after_lines = line_set(after);

    let added: Vec<&str> = after_lines.difference(&before_lines).copied().collect();
    let removed: Vec<&str> = before_lines.difference(&after_lines).copied().collect();

    let mut added_categories = BTreeSet::new();
    for line in &added {
        added_categories.extend(categories_for(line));
    }
    let mut removed_categories = BTreeSet::new();
    for line in &removed {
        removed_categories.extend(categories_for(line));
    }

    let mut classes = BTreeSet::new();
    for &category in added_categories.union(&removed_categories) {
        let was_added = added_categories.contains(&category);
        let was_removed = removed_categories.contains(&category);
        match (category, was_added, was_removed) {
            (Category::Function, true, true) => {
                classes.insert(MutationClass::ModifyFunction);
            }
            (Category::Function, true, false) => {
                classes.insert(MutationClass::AddFunction);
            }
            (Category::Function, false, true) => {
                classes.insert(MutationClass::DeleteFunction);
            }
            (Category::Class, true, true) => {
                classes.insert(MutationClass::ModifyClass);
            }
            (Category::Class, true, false) => {
                classes.insert(MutationClass::AddClass);
            }
            (Category::Class, false, true) => {
                classes.insert(MutationClass::DeleteClass);
            }
            (Category::Import, true, true) => {
                classes.insert(MutationClass::ModifyImport);
            }
            (Category::Import, true, false) => {
                classes.insert(MutationClass::AddImport);
            }
            (Category::Import, false, true) => {
                classes.insert(MutationClass::DeleteImport);
            }
            // Exports have no modify form; both polarities stand.
            (Category::Export, added_hit, removed_hit) => {
                if added_hit {
                    classes.insert(MutationClass::AddExport);
                }
                if removed_hit {
                    classes.insert(MutationClass::DeleteExport);
                }
            }
            (Category::Type, true, false) => {
                classes.insert(MutationClass::AddType);
            }
            // The tag set has no DELETE_TYPE; a removed-only type line
            // degrades to the modify form, as does a paired add+remove.
            (Category::Type, _, true) => {
                classes.insert(MutationClass::ModifyType);
            }
            (_, false, false) => unreachable!("category came from the union of both sets"),
        }
    }

    if classes.is_empty() && (!added.is_empty() || !removed.is_empty()) {
        classes.insert(MutationClass::RefactorBlock);
    }

    classes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(classes: &[MutationClass]) -> BTreeSet<MutationClass> {
        classes.iter().copied().collect()
    }

    #[test]
    fn identical_content_yields_nothing() {
        let source = "export function hash(){}\nlet x = 1\n";
        assert!(classify(source, source).is_empty());
        assert!(classify("", "").is_empty());
    }

    #[test]
    fn added_export_function_is_both_function_and_export() {
        let classes = classify("", "export function hash(){}\n");
        assert_eq!(
            classes,
            set(&[MutationClass::AddFunction, MutationClass::AddExport])
        );
    }

    #[test]
    fn renamed_function_collapses_to_modify() {
        let classes = classify("function a(){}\n", "function b(){}\n");
        assert_eq!(classes, set(&[MutationClass::ModifyFunction]));
    }

    #[test]
    fn unmatched_change_falls_back_to_refactor_block() {
        let classes = classify("let x = 1\n", "let x = 2\n");
        assert_eq!(classes, set(&[MutationClass::RefactorBlock]));
    }

    #[test]
    fn arrow_functions_count_as_functions() {
        let classes = classify("", "const handler = async (req) => respond(req)\n");
        assert_eq!(classes, set(&[MutationClass::AddFunction]));
    }

    #[test]
    fn method_signatures_count_as_functions() {
        let classes = classify("", "  render(props: Props): Element {\n");
        assert_eq!(classes, set(&[MutationClass::AddFunction]));

        // Control flow with a type-ish tail must not look like a method.
        let classes = classify("", "  if (ready): boolean\n");
        assert_eq!(classes, set(&[MutationClass::RefactorBlock]));
    }

    #[test]
    fn import_changes_collapse_like_functions() {
        let before = "import { a } from \"./a\"\n";
        let after = "import { b } from \"./b\"\n";
        assert_eq!(classify(before, after), set(&[MutationClass::ModifyImport]));
        assert_eq!(classify("", after), set(&[MutationClass::AddImport]));
        assert_eq!(classify(before, ""), set(&[MutationClass::DeleteImport]));
    }

    #[test]
    fn class_changes_cover_all_three_forms() {
        let before = "export class Session {\n";
        let after = "export class Connection {\n";
        let classes = classify(before, after);
        assert!(classes.contains(&MutationClass::ModifyClass));
        assert_eq!(classify("", before), set(&[MutationClass::AddClass, MutationClass::AddExport]));
    }

    #[test]
    fn type_and_interface_changes_share_the_type_tags() {
        assert_eq!(
            classify("", "type Id = string\n"),
            set(&[MutationClass::AddType])
        );
        assert_eq!(
            classify("type Id = string\n", "type Id = number\n"),
            set(&[MutationClass::ModifyType])
        );
        // No DELETE_TYPE exists; a pure removal degrades to modify.
        assert_eq!(
            classify("interface Row { id: string }\n", ""),
            set(&[MutationClass::ModifyType])
        );
    }

    #[test]
    fn export_polarities_do_not_collapse() {
        let before = "export default config\n";
        let after = "export const config = {}\n";
        let classes = classify(before, after);
        assert!(classes.contains(&MutationClass::AddExport));
        assert!(classes.contains(&MutationClass::DeleteExport));
    }

    #[test]
    fn formatter_churn_is_invisible() {
        let before = "function a(){}\nlet x = 1\n";
        let reindented = "   function a(){}\n\n\nlet x = 1\n";
        assert!(classify(before, reindented).is_empty());
    }

    #[test]
    fn wire_names_round_trip() {
        for class in [
            MutationClass::AddFunction,
            MutationClass::ModifyImport,
            MutationClass::DeleteExport,
            MutationClass::RefactorBlock,
        ] {
            assert_eq!(class.as_str().parse::<MutationClass>().unwrap(), class);
            let json = serde_json::to_string(&class).unwrap();
            assert_eq!(json, format!("\"{}\"", class.as_str()));
        }
        assert!("DELETE_TYPE".parse::<MutationClass>().is_err());
    }
}
