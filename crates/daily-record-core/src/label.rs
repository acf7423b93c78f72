use once_cell::sync::Lazy;
use regex_lite::Regex;

/// Separator used in canonical compound labels.
pub const EN_DASH: &str = "\u{2013}";

#[allow(clippy::expect_used)]
static CUSP_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bcusp\b").expect("cusp marker pattern is valid"));

#[allow(clippy::expect_used)]
static TRAILING_CUSP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*\bcusp\s*$").expect("trailing cusp pattern is valid"));

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct NormalizedLabel {
    pub compound_with_suffix: Option<String>,
    pub compound_no_suffix: String,
    pub components: Vec<String>,
    pub has_suffix: bool,
}

impl NormalizedLabel {
    /// True for labels spanning several components or carrying a cusp marker.
    #[must_use]
    pub fn is_compound(&self) -> bool {
        self.has_suffix || self.components.len() > 1
    }
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_dashes(value: &str) -> String {
    value.replace(['\u{2013}', '\u{2014}'], "-")
}

fn title_case_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn title_case(component: &str) -> String {
    component.split_whitespace().map(title_case_word).collect::<Vec<_>>().join(" ")
}

/// Canonicalize a subject label into its compound forms and components.
///
/// `"gemini-cancer cusp"` becomes `"Gemini–Cancer Cusp"` / `"Gemini–Cancer"` with
/// components `["Gemini", "Cancer"]`. Blank input yields the empty label.
#[must_use]
pub fn normalize_label(raw: &str) -> NormalizedLabel {
    let collapsed = collapse_whitespace(raw);
    if collapsed.is_empty() {
        return NormalizedLabel::default();
    }

    let has_suffix = CUSP_MARKER.is_match(&collapsed);
    let dashed = normalize_dashes(&collapsed);
    let base = TRAILING_CUSP.replace(&dashed, "");

    let components = base
        .split('-')
        .map(title_case)
        .filter(|component| !component.is_empty())
        .collect::<Vec<_>>();
    let compound_no_suffix = components.join(EN_DASH);
    let compound_with_suffix = (has_suffix && !compound_no_suffix.is_empty())
        .then(|| format!("{compound_no_suffix} Cusp"));

    NormalizedLabel { compound_with_suffix, compound_no_suffix, components, has_suffix }
}

fn equivalence_key(value: &str) -> String {
    let lowered = collapse_whitespace(value).to_lowercase();
    let dashed = normalize_dashes(&lowered);
    let stripped = TRAILING_CUSP.replace(&dashed, "");
    stripped
        .split('-')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("-")
        .trim_matches('-')
        .trim()
        .to_string()
}

/// Matching predicate between a subject attempt and a stored subject.
///
/// Case, whitespace runs, dash style and a trailing cusp marker are ignored on both sides.
#[must_use]
pub fn labels_equivalent(lhs: &str, rhs: &str) -> bool {
    equivalence_key(lhs) == equivalence_key(rhs)
}

/// Candidate subject spellings, most specific first, without duplicates.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct SubjectAttempts(Vec<String>);

impl SubjectAttempts {
    #[must_use]
    pub fn build(raw: &str, allow_component_fallback: bool) -> Self {
        let label = normalize_label(raw);
        let mut attempts = Self::default();

        if let Some(suffixed) = &label.compound_with_suffix {
            attempts.push(suffixed.clone());
            attempts.push(suffixed.replace(EN_DASH, "-"));
        }
        attempts.push(label.compound_no_suffix.clone());
        attempts.push(label.compound_no_suffix.replace(EN_DASH, "-"));

        if allow_component_fallback && label.is_compound() {
            for component in &label.components {
                attempts.push(component.clone());
            }
        }

        attempts
    }

    fn push(&mut self, candidate: String) {
        if !candidate.is_empty() && !self.0.contains(&candidate) {
            self.0.push(candidate);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl<'a> IntoIterator for &'a SubjectAttempts {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
