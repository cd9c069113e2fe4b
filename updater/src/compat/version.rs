//! PEP 440 version identifiers
//!
//! Installed Python packages report versions such as `2.1.0+cu121`,
//! `2.0.0rc1` or `1!2.0.post3.dev1`. Ordering follows PEP 440: a dev
//! release sorts before its pre-releases, pre-releases before the final
//! release, post releases after it, and a local segment only after the
//! matching public version.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::errors::UpdateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PreKind {
    Alpha,
    Beta,
    Rc,
}

impl PreKind {
    fn as_str(&self) -> &'static str {
        match self {
            PreKind::Alpha => "a",
            PreKind::Beta => "b",
            PreKind::Rc => "rc",
        }
    }
}

// Alphanumeric local parts sort before numeric ones
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum LocalPart {
    Text(String),
    Number(u64),
}

impl fmt::Display for LocalPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalPart::Text(s) => f.write_str(s),
            LocalPart::Number(n) => write!(f, "{}", n),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Version {
    pub epoch: u64,
    pub release: Vec<u64>,
    pub pre: Option<(PreKind, u64)>,
    pub post: Option<u64>,
    pub dev: Option<u64>,
    local: Vec<LocalPart>,
}

// Position of the pre-release segment in the total order
#[derive(PartialEq, Eq, PartialOrd, Ord)]
enum PreKey {
    DevOnly,
    Pre(PreKind, u64),
    Final,
}

impl Version {
    pub fn has_local(&self) -> bool {
        !self.local.is_empty()
    }

    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }

    /// The public version, local segment dropped
    pub fn public(&self) -> Version {
        Version {
            local: Vec::new(),
            ..self.clone()
        }
    }

    /// Same epoch and release numbers, missing components count as zero
    pub fn same_release(&self, other: &Version) -> bool {
        self.epoch == other.epoch && cmp_release(&self.release, &other.release).is_eq()
    }

    /// Epoch matches and the release starts with `prefix`
    pub fn release_starts_with(&self, epoch: u64, prefix: &[u64]) -> bool {
        self.epoch == epoch
            && prefix
                .iter()
                .enumerate()
                .all(|(i, n)| self.release.get(i).copied().unwrap_or(0) == *n)
    }

    fn pre_key(&self) -> PreKey {
        match (self.pre, self.post, self.dev) {
            (Some((kind, n)), _, _) => PreKey::Pre(kind, n),
            (None, None, Some(_)) => PreKey::DevOnly,
            _ => PreKey::Final,
        }
    }
}

fn cmp_release(a: &[u64], b: &[u64]) -> Ordering {
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| {
            a.get(i)
                .copied()
                .unwrap_or(0)
                .cmp(&b.get(i).copied().unwrap_or(0))
        })
        .find(|ord| ord.is_ne())
        .unwrap_or(Ordering::Equal)
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| cmp_release(&self.release, &other.release))
            .then_with(|| self.pre_key().cmp(&other.pre_key()))
            .then_with(|| self.post.cmp(&other.post))
            // A missing dev segment sorts after any dev release
            .then_with(|| (self.dev.is_none(), self.dev).cmp(&(other.dev.is_none(), other.dev)))
            .then_with(|| self.local.cmp(&other.local))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}!", self.epoch)?;
        }
        let release: Vec<String> = self.release.iter().map(|n| n.to_string()).collect();
        f.write_str(&release.join("."))?;
        if let Some((kind, n)) = self.pre {
            write!(f, "{}{}", kind.as_str(), n)?;
        }
        if let Some(n) = self.post {
            write!(f, ".post{}", n)?;
        }
        if let Some(n) = self.dev {
            write!(f, ".dev{}", n)?;
        }
        if self.has_local() {
            let local: Vec<String> = self.local.iter().map(|p| p.to_string()).collect();
            write!(f, "+{}", local.join("."))?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s).ok_or_else(|| UpdateError::ConfigError(format!("invalid version: {}", s)))
    }
}

const PRE_LABELS: &[(&str, PreKind)] = &[
    ("alpha", PreKind::Alpha),
    ("beta", PreKind::Beta),
    ("preview", PreKind::Rc),
    ("pre", PreKind::Rc),
    ("rc", PreKind::Rc),
    ("a", PreKind::Alpha),
    ("b", PreKind::Beta),
    ("c", PreKind::Rc),
];

const POST_LABELS: &[&str] = &["post", "rev", "r"];

struct Cursor<'a> {
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    fn eat_sep(&mut self) -> bool {
        match self.rest.chars().next() {
            Some('.' | '-' | '_') => {
                self.rest = &self.rest[1..];
                true
            }
            _ => false,
        }
    }

    fn eat_number(&mut self) -> Option<u64> {
        let end = self
            .rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(self.rest.len());
        if end == 0 {
            return None;
        }
        let n = self.rest[..end].parse().ok()?;
        self.rest = &self.rest[end..];
        Some(n)
    }

    fn eat_label<T: Copy>(&mut self, labels: &[(&str, T)]) -> Option<T> {
        labels.iter().find_map(|(label, value)| {
            self.rest.strip_prefix(label).map(|rest| {
                self.rest = rest;
                *value
            })
        })
    }

    // `[sep]label[sep][number]`, restoring the position when absent
    fn labelled<T: Copy>(&mut self, labels: &[(&str, T)]) -> Option<(T, u64)> {
        let start = self.rest;
        self.eat_sep();
        let Some(value) = self.eat_label(labels) else {
            self.rest = start;
            return None;
        };
        let before_sep = self.rest;
        self.eat_sep();
        let n = match self.eat_number() {
            Some(n) => n,
            None => {
                self.rest = before_sep;
                0
            }
        };
        Some((value, n))
    }
}

fn parse(input: &str) -> Option<Version> {
    let lowered = input.trim().to_ascii_lowercase();
    let text = lowered.strip_prefix('v').unwrap_or(&lowered);

    let (public, local) = match text.split_once('+') {
        Some((public, local)) => (public, Some(local)),
        None => (text, None),
    };
    let local = match local {
        Some(local) => parse_local(local)?,
        None => Vec::new(),
    };

    let (epoch, public) = match public.split_once('!') {
        Some((epoch, rest)) => (epoch.parse().ok()?, rest),
        None => (0, public),
    };

    let mut cursor = Cursor { rest: public };
    let mut release = vec![cursor.eat_number()?];
    while cursor.rest.starts_with('.') {
        let start = cursor.rest;
        cursor.rest = &cursor.rest[1..];
        match cursor.eat_number() {
            Some(n) => release.push(n),
            None => {
                cursor.rest = start;
                break;
            }
        }
    }

    let pre = cursor.labelled(PRE_LABELS);

    let post_labels: Vec<(&str, ())> = POST_LABELS.iter().map(|l| (*l, ())).collect();
    let post = match cursor.labelled(&post_labels) {
        Some(((), n)) => Some(n),
        // Implicit post release: `1.0-1`
        None if cursor.rest.starts_with('-') => {
            cursor.rest = &cursor.rest[1..];
            Some(cursor.eat_number()?)
        }
        None => None,
    };

    let dev = cursor.labelled(&[("dev", ())]).map(|((), n)| n);

    if !cursor.rest.is_empty() {
        return None;
    }

    Some(Version {
        epoch,
        release,
        pre,
        post,
        dev,
        local,
    })
}

fn parse_local(local: &str) -> Option<Vec<LocalPart>> {
    local
        .split(['.', '-', '_'])
        .map(|part| {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_alphanumeric()) {
                None
            } else if part.chars().all(|c| c.is_ascii_digit()) {
                part.parse().ok().map(LocalPart::Number)
            } else {
                Some(LocalPart::Text(part.to_string()))
            }
        })
        .collect()
}
