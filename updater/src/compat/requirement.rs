//! Requirement line parsing and specifier matching

use std::fmt;

use crate::compat::version::Version;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Ge,
    Le,
    Gt,
    Lt,
    Compatible,
    Arbitrary,
}

impl Op {
    fn as_str(&self) -> &'static str {
        match self {
            Op::Eq => "==",
            Op::Ne => "!=",
            Op::Ge => ">=",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Lt => "<",
            Op::Compatible => "~=",
            Op::Arbitrary => "===",
        }
    }
}

// Longer operators must be tried before their prefixes
const OPERATORS: [(&str, Op); 8] = [
    ("===", Op::Arbitrary),
    ("==", Op::Eq),
    ("!=", Op::Ne),
    (">=", Op::Ge),
    ("<=", Op::Le),
    ("~=", Op::Compatible),
    (">", Op::Gt),
    ("<", Op::Lt),
];

/// One `<op><version>` clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Specifier {
    pub op: Op,
    /// Version text as written, without a trailing `.*`
    pub version: String,
    pub wildcard: bool,
}

impl Specifier {
    fn parse(clause: &str) -> Option<Self> {
        let clause = clause.trim();
        let (op, version) = OPERATORS.iter().find_map(|(token, op)| {
            clause.strip_prefix(*token).map(|v| (*op, v.trim()))
        })?;
        let (version, wildcard) = match version.strip_suffix(".*") {
            Some(prefix) if matches!(op, Op::Eq | Op::Ne) => (prefix, true),
            _ => (version, false),
        };
        (!version.is_empty()).then(|| Self {
            op,
            version: version.to_string(),
            wildcard,
        })
    }

    /// PEP 440 containment; unparseable versions never match
    pub fn contains(&self, installed: &str) -> bool {
        if self.op == Op::Arbitrary {
            return installed.trim().eq_ignore_ascii_case(&self.version);
        }
        let (Ok(candidate), Ok(wanted)) = (installed.parse::<Version>(), self.version.parse::<Version>())
        else {
            return false;
        };
        // Local segments only take part in exact matches that name one
        let public = candidate.public();

        match self.op {
            Op::Eq if self.wildcard => public.release_starts_with(wanted.epoch, &wanted.release),
            Op::Ne if self.wildcard => !public.release_starts_with(wanted.epoch, &wanted.release),
            Op::Eq => exact(&candidate, &wanted),
            Op::Ne => !exact(&candidate, &wanted),
            Op::Ge => public >= wanted,
            Op::Le => public <= wanted,
            // `>1.0` excludes 1.0.post1 unless a post release is named
            Op::Gt => {
                public > wanted
                    && !(wanted.post.is_none()
                        && public.post.is_some()
                        && public.same_release(&wanted)
                        && public.pre == wanted.pre)
            }
            // `<2.0` excludes 2.0rc1 unless a pre-release is named
            Op::Lt => {
                public < wanted
                    && !(!wanted.is_prerelease()
                        && public.is_prerelease()
                        && public.same_release(&wanted))
            }
            // `~=1.4.2` means `>=1.4.2, ==1.4.*`
            Op::Compatible => {
                let series = wanted.release.len().saturating_sub(1);
                series >= 1
                    && public >= wanted
                    && public.release_starts_with(wanted.epoch, &wanted.release[..series])
            }
            Op::Arbitrary => false,
        }
    }
}

fn exact(candidate: &Version, wanted: &Version) -> bool {
    if wanted.has_local() {
        candidate == wanted
    } else {
        candidate.public() == *wanted
    }
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op.as_str(), self.version)?;
        if self.wildcard {
            f.write_str(".*")?;
        }
        Ok(())
    }
}

/// A single declared dependency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    /// Normalized package name
    pub name: String,
    pub clauses: Vec<Specifier>,
}

impl Requirement {
    /// Parse one requirements line; `None` for blanks, comments and options
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() || line.starts_with('-') {
            return None;
        }
        // Environment markers
        let line = line.split(';').next().unwrap_or("").trim();

        let name_end = line
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'))
            .unwrap_or(line.len());
        let name = &line[..name_end];
        if name.is_empty() {
            return None;
        }

        let mut rest = line[name_end..].trim();
        // Extras
        if rest.starts_with('[') {
            rest = rest.find(']').map(|i| rest[i + 1..].trim()).unwrap_or("");
        }

        let clauses = rest.split(',').filter_map(Specifier::parse).collect();

        Some(Self {
            name: normalize_name(name),
            clauses,
        })
    }

    /// True when `installed` satisfies every clause
    pub fn matches(&self, installed: &str) -> bool {
        self.clauses.iter().all(|clause| clause.contains(installed))
    }

    /// Clauses rendered back, `any` when unconstrained
    pub fn spec_string(&self) -> String {
        if self.clauses.is_empty() {
            return "any".to_string();
        }
        self.clauses
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

pub fn parse_requirements(contents: &str) -> Vec<Requirement> {
    contents.lines().filter_map(Requirement::parse).collect()
}

/// Lowercase and fold `-`, `_` and `.` into `-`
pub fn normalize_name(name: &str) -> String {
    name.trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c == '_' || c == '.' { '-' } else { c })
        .collect()
}
