use std::path::Path;

use serde::Serialize;

use crate::config::CompiledGrammar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HierarchyLevel {
    Root,
    TestName,
    Release,
    Timestamp,
    Snapshot,
}

impl HierarchyLevel {
    const ALL: [Self; 5] = [
        Self::Root,
        Self::TestName,
        Self::Release,
        Self::Timestamp,
        Self::Snapshot,
    ];

    pub fn from_depth(depth: usize) -> Option<Self> {
        Self::ALL.get(depth).copied()
    }

    pub fn depth(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathMatch {
    NotMatched,
    Matched {
        level: HierarchyLevel,
        tokens: Vec<String>,
    },
}

impl PathMatch {
    pub fn level(&self) -> Option<HierarchyLevel> {
        match self {
            Self::NotMatched => None,
            Self::Matched { level, .. } => Some(*level),
        }
    }

    pub fn level_value(&self) -> i32 {
        self.level().map_or(-1, |level| level.depth() as i32)
    }

    pub fn tokens(&self) -> &[String] {
        match self {
            Self::NotMatched => &[],
            Self::Matched { tokens, .. } => tokens,
        }
    }

    pub fn test_name(&self) -> Option<&str> {
        self.tokens().first().map(String::as_str)
    }

    pub fn release(&self) -> Option<&str> {
        self.tokens().get(1).map(String::as_str)
    }
}

pub fn classify_path(path: &Path, grammar: &CompiledGrammar) -> PathMatch {
    let text = path.to_string_lossy();
    if split_root(&text).0.is_some() {
        return classify(&text, grammar);
    }

    // Relative paths resolve against the working directory without touching the disk.
    match std::path::absolute(path) {
        Ok(absolute) => classify(&absolute.to_string_lossy(), grammar),
        Err(_) => classify(&text, grammar),
    }
}

pub fn classify(path: &str, grammar: &CompiledGrammar) -> PathMatch {
    let segments = path_segments(path);

    let Some(start) = find_root_marker(&segments, &grammar.root_markers) else {
        return PathMatch::NotMatched;
    };

    let mut tokens = Vec::new();
    for (pattern, segment) in grammar.levels.iter().zip(&segments[start..]) {
        if !pattern.is_match(segment) {
            return PathMatch::NotMatched;
        }
        tokens.push(segment.clone());
    }

    match HierarchyLevel::from_depth(tokens.len()) {
        Some(level) => PathMatch::Matched { level, tokens },
        None => PathMatch::NotMatched,
    }
}

fn find_root_marker(segments: &[String], markers: &[(String, String)]) -> Option<usize> {
    segments
        .windows(2)
        .position(|pair| {
            markers
                .iter()
                .any(|(parent, child)| pair[0] == *parent && pair[1] == *child)
        })
        .map(|idx| idx + 2)
}

pub fn path_segments(path: &str) -> Vec<String> {
    let (root, rest) = split_root(path);
    let root_len = usize::from(root.is_some());
    let mut segments: Vec<String> = root.into_iter().collect();

    for part in rest.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                let can_pop = segments.len() > root_len
                    && segments.last().is_some_and(|last| last != "..");
                if can_pop {
                    segments.pop();
                } else if root_len == 0 {
                    segments.push(part.to_string());
                }
            }
            _ => segments.push(part.to_string()),
        }
    }

    segments
}

fn split_root(path: &str) -> (Option<String>, &str) {
    if path.starts_with(r"\\") || path.starts_with("//") {
        let trimmed = path.trim_start_matches(['\\', '/']);
        let (server, rest) = trimmed
            .split_once(['\\', '/'])
            .unwrap_or((trimmed, ""));
        return (Some(format!(r"\\{server}")), rest);
    }

    let bytes = path.as_bytes();
    if bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && matches!(bytes[2], b'\\' | b'/')
    {
        let drive = bytes[0].to_ascii_uppercase() as char;
        return (Some(format!("{drive}:\\")), &path[3..]);
    }

    if let Some(rest) = path.strip_prefix('/') {
        return (Some("/".to_string()), rest);
    }

    (None, path)
}
