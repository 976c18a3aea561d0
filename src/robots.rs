//! robots.txt parsing and matching (RFC 9309 subset).

/// A single `Allow`/`Disallow` rule line.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Rule {
    allow: bool,
    pattern: String,
}

/// Rules selected for one user-agent, either from its specific group or
/// (only if no specific group matched) the wildcard `*` group.
#[derive(Debug, Clone, Default)]
pub struct Robots {
    rules: Vec<Rule>,
}

#[derive(Debug, Clone, Default)]
struct Group {
    agents: Vec<String>,
    rules: Vec<Rule>,
}

impl Robots {
    /// Parses `body` and selects the group matching `user_agent`
    /// (case-insensitive), falling back to the wildcard `*` group if no
    /// specific group matches.
    pub fn parse(body: &str, user_agent: &str) -> Self {
        let groups = parse_groups(body);
        let agent_lower = user_agent.to_ascii_lowercase();

        let specific = groups.iter().find(|g| {
            g.agents
                .iter()
                .any(|a| a.eq_ignore_ascii_case(&agent_lower) || a == &agent_lower)
        });

        let selected = specific.or_else(|| groups.iter().find(|g| g.agents.iter().any(|a| a == "*")));

        Self {
            rules: selected.map(|g| g.rules.clone()).unwrap_or_default(),
        }
    }

    /// Returns true iff `path` is allowed: over all rules, the rule with the
    /// longest matching pattern wins; ties go to the later rule; default
    /// allow when nothing matches.
    pub fn is_allowed(&self, path: &str) -> bool {
        let mut best: Option<(usize, bool)> = None; // (pattern length, allow)
        for rule in &self.rules {
            if rule.pattern.is_empty() {
                continue;
            }
            if !pattern_matches(&rule.pattern, path) {
                continue;
            }
            let len = rule.pattern.len();
            match best {
                Some((best_len, _)) if len < best_len => {}
                _ => best = Some((len, rule.allow)),
            }
        }
        best.map(|(_, allow)| allow).unwrap_or(true)
    }
}

fn parse_groups(body: &str) -> Vec<Group> {
    let mut groups = Vec::new();
    let mut current: Option<Group> = None;

    for raw_line in body.lines() {
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            if let Some(g) = current.take() {
                if !g.agents.is_empty() {
                    groups.push(g);
                }
            }
            continue;
        }
        let Some((key, value)) = split_key_value(line) else {
            continue;
        };
        match key.to_ascii_lowercase().as_str() {
            "user-agent" => {
                let agent = value.trim().to_ascii_lowercase();
                match &mut current {
                    Some(g) if !g.rules.is_empty() => {
                        // A user-agent line after rules starts a new group.
                        groups.push(current.take().unwrap());
                        current = Some(Group {
                            agents: vec![agent],
                            rules: Vec::new(),
                        });
                    }
                    Some(g) => g.agents.push(agent),
                    None => {
                        current = Some(Group {
                            agents: vec![agent],
                            rules: Vec::new(),
                        });
                    }
                }
            }
            "allow" | "disallow" => {
                let allow = key.eq_ignore_ascii_case("allow");
                let pattern = value.trim().to_string();
                if let Some(g) = &mut current {
                    g.rules.push(Rule { allow, pattern });
                }
            }
            _ => {}
        }
    }
    if let Some(g) = current.take() {
        if !g.agents.is_empty() {
            groups.push(g);
        }
    }
    groups
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(i) => &line[..i],
        None => line,
    }
}

fn split_key_value(line: &str) -> Option<(&str, &str)> {
    let idx = line.find(':')?;
    Some((&line[..idx], &line[idx + 1..]))
}

/// Matches `pattern` against `path`: `*` matches zero or more of any
/// character, a trailing `$` anchors the end, otherwise it's a prefix match.
fn pattern_matches(pattern: &str, path: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };

    let segments: Vec<&str> = pattern.split('*').collect();
    if segments.len() == 1 {
        return if anchored {
            path == segments[0]
        } else {
            path.starts_with(segments[0])
        };
    }

    let mut rest = path;
    for (i, seg) in segments.iter().enumerate() {
        if i == 0 {
            if !rest.starts_with(seg) {
                return false;
            }
            rest = &rest[seg.len()..];
            continue;
        }
        match rest.find(seg) {
            Some(pos) => {
                rest = &rest[pos + seg.len()..];
            }
            None => return false,
        }
    }
    if anchored {
        rest.is_empty()
    } else {
        true
    }
}
