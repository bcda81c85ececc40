//! Maven version ordering.
//!
//! Follows the rules of Maven's `ComparableVersion`: versions are split into
//! items at `.`/`-` and at digit/letter transitions, transitions and `-`
//! open a nested list, trailing "null" items are trimmed, numbers compare
//! numerically and known qualifiers compare by rank.

use std::cmp::Ordering;
use std::fmt;

const QUALIFIERS: [&str; 7] = ["alpha", "beta", "milestone", "rc", "snapshot", "", "sp"];
const RELEASE_RANK: &str = "5";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Item {
    /// Decimal digits without leading zeros, `""` for zero.
    Int(String),
    Str(String),
    List(Vec<Item>),
}

fn qualifier_rank(q: &str) -> String {
    match QUALIFIERS.iter().position(|k| *k == q) {
        Some(i) => i.to_string(),
        None => format!("{}-{}", QUALIFIERS.len(), q),
    }
}

fn int_item(digits: &str) -> Item {
    Item::Int(digits.trim_start_matches('0').to_string())
}

fn str_item(value: &str, followed_by_digit: bool) -> Item {
    let value = if followed_by_digit && value.len() == 1 {
        match value {
            "a" => "alpha",
            "b" => "beta",
            "m" => "milestone",
            other => other,
        }
    } else {
        value
    };
    let value = match value {
        "ga" | "final" | "release" => "",
        "cr" => "rc",
        other => other,
    };
    Item::Str(value.to_string())
}

impl Item {
    fn is_null(&self) -> bool {
        match self {
            Item::Int(d) => d.is_empty(),
            Item::Str(s) => qualifier_rank(s) == RELEASE_RANK,
            Item::List(items) => items.is_empty(),
        }
    }

    fn compare(&self, other: Option<&Item>) -> Ordering {
        match (self, other) {
            (Item::Int(d), None) => {
                if d.is_empty() {
                    Ordering::Equal
                } else {
                    Ordering::Greater
                }
            }
            (Item::Int(a), Some(Item::Int(b))) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Item::Int(_), Some(_)) => Ordering::Greater,

            (Item::Str(s), None) => qualifier_rank(s).as_str().cmp(RELEASE_RANK),
            (Item::Str(_), Some(Item::Int(_))) => Ordering::Less,
            (Item::Str(a), Some(Item::Str(b))) => qualifier_rank(a).cmp(&qualifier_rank(b)),
            (Item::Str(_), Some(Item::List(_))) => Ordering::Less,

            (Item::List(items), None) => match items.first() {
                Some(first) => first.compare(None),
                None => Ordering::Equal,
            },
            (Item::List(_), Some(Item::Int(_))) => Ordering::Less,
            (Item::List(_), Some(Item::Str(_))) => Ordering::Greater,
            (Item::List(left), Some(Item::List(right))) => {
                let len = left.len().max(right.len());
                for i in 0..len {
                    let result = match (left.get(i), right.get(i)) {
                        (None, None) => Ordering::Equal,
                        (None, Some(r)) => r.compare(None).reverse(),
                        (Some(l), r) => l.compare(r),
                    };
                    if result != Ordering::Equal {
                        return result;
                    }
                }
                Ordering::Equal
            }
        }
    }
}

fn normalize(items: &mut Vec<Item>) {
    let mut i = items.len();
    while i > 0 {
        i -= 1;
        if items[i].is_null() {
            items.remove(i);
        } else if !matches!(items[i], Item::List(_)) {
            break;
        }
    }
}

/// Builds the nested item tree. Nesting is tracked as a path of indices into
/// the tree instead of a stack of mutable references.
fn parse(version: &str) -> Item {
    let lower = version.to_lowercase();
    let chars: Vec<char> = lower.chars().collect();
    let mut root: Vec<Item> = Vec::new();
    let mut path: Vec<usize> = Vec::new();
    let mut is_digit = false;
    let mut start = 0;

    fn current<'a>(root: &'a mut Vec<Item>, path: &[usize]) -> &'a mut Vec<Item> {
        let mut list = root;
        for &idx in path {
            let parent = list;
            list = match &mut parent[idx] {
                Item::List(inner) => inner,
                _ => unreachable!("path only points at lists"),
            };
        }
        list
    }

    fn token(chars: &[char], from: usize, to: usize) -> String {
        chars[from..to].iter().collect()
    }

    fn open_list(root: &mut Vec<Item>, path: &mut Vec<usize>) {
        let list = current(root, path);
        list.push(Item::List(Vec::new()));
        let idx = list.len() - 1;
        path.push(idx);
    }

    for (i, &c) in chars.iter().enumerate() {
        if c == '.' || c == '-' {
            let item = if i == start {
                Item::Int(String::new())
            } else if is_digit {
                int_item(&token(&chars, start, i))
            } else {
                str_item(&token(&chars, start, i), false)
            };
            current(&mut root, &path).push(item);
            start = i + 1;
            if c == '-' {
                open_list(&mut root, &mut path);
            }
        } else if c.is_ascii_digit() {
            if !is_digit && i > start {
                // `.X1` is treated like `-X1`
                if !current(&mut root, &path).is_empty() {
                    open_list(&mut root, &mut path);
                }
                let item = str_item(&token(&chars, start, i), true);
                current(&mut root, &path).push(item);
                start = i;
                open_list(&mut root, &mut path);
            }
            is_digit = true;
        } else {
            if is_digit && i > start {
                let item = int_item(&token(&chars, start, i));
                current(&mut root, &path).push(item);
                start = i;
                open_list(&mut root, &mut path);
            }
            is_digit = false;
        }
    }
    if chars.len() > start {
        let item = if is_digit {
            int_item(&token(&chars, start, chars.len()))
        } else {
            str_item(&token(&chars, start, chars.len()), false)
        };
        current(&mut root, &path).push(item);
    }

    // innermost lists first, like popping the parse stack
    while !path.is_empty() {
        normalize(current(&mut root, &path));
        path.pop();
    }
    normalize(&mut root);
    Item::List(root)
}

/// A version string with Maven ordering.
///
/// Versions that Maven considers equal (`1.0` and `1.0.0`) are ordered by
/// their raw text, so the order is total and distinct spellings survive in
/// ordered sets.
#[derive(Debug, Clone)]
pub struct MavenVersion {
    raw: String,
    canonical: Item,
}

impl MavenVersion {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into().trim().to_string();
        let canonical = parse(&raw);
        Self { raw, canonical }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_snapshot(&self) -> bool {
        self.raw.to_ascii_uppercase().ends_with("-SNAPSHOT")
    }

    /// Maven equivalence, ignoring spelling.
    pub fn equivalent(&self, other: &MavenVersion) -> bool {
        self.canonical.compare(Some(&other.canonical)) == Ordering::Equal
    }
}

impl PartialEq for MavenVersion {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for MavenVersion {}

impl Ord for MavenVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical
            .compare(Some(&other.canonical))
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for MavenVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for MavenVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
