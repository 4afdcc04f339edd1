//! Lexical stability analyzer.
//!
//! `chaosmonger` measured these same quantities by walking a real `ast`
//! tree; this crate has no interpreter for whatever language an ephemeral
//! sub-agent's source happens to be written in, so the same five passes
//! run over an indentation-tracked line scan instead. Good enough to
//! score arbitrary generated snippets; not a real parser, and it doesn't
//! claim to be.

use std::collections::HashSet;

use regex::Regex;

use super::types::{import_risk, whitelisted_import_risk, StabilityConfig, StabilityMetrics, StabilityResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Loop,
    Other,
}

struct Block {
    indent: usize,
    kind: BlockKind,
}

fn indent_of(line: &str) -> usize {
    line.chars().take_while(|c| *c == ' ').count() + line.chars().take_while(|c| *c == '\t').count() * 4
}

fn is_block_header(trimmed: &str) -> bool {
    trimmed.ends_with(':')
}

const LOOP_KEYWORDS: &[&str] = &["for ", "while "];
const NESTING_KEYWORDS: &[&str] = &["if ", "elif ", "else", "for ", "while ", "with ", "try", "except", "finally", "def ", "async def ", "class "];

fn starts_with_any(trimmed: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| trimmed == k.trim_end() || trimmed.starts_with(k))
}

/// Analyze `source` for the five ordered stability passes. `entropy_budget`
/// scales every threshold except `max_nesting_depth`/`max_depth`, which are
/// absolute.
pub fn analyze_stability(source: &str, entropy_budget: f32, config: &StabilityConfig) -> StabilityResult {
    let mut violations = Vec::new();

    // Pass 1: parse. A real parser would fail fast here; this scanner has
    // no notion of syntax error, so an empty source is the only thing
    // treated as unparseable.
    if source.trim().is_empty() {
        return StabilityResult {
            is_stable: false,
            metrics: StabilityMetrics {
                cyclomatic_complexity: 0,
                branching_factor: 0,
                import_risk: 0.0,
                has_unbounded_recursion: false,
                estimated_runtime: "unknown".to_string(),
                import_count: 0,
                function_count: 0,
                max_nesting_depth: 0,
            },
            violations: vec!["syntax error: empty source".to_string()],
        };
    }

    let lines: Vec<&str> = source.lines().collect();

    // Pass 2: imports.
    let imports = extract_imports(source);
    let mut import_risk_total = 0.0f32;
    for imp in &imports {
        if config.forbidden_imports.contains(imp) {
            violations.push(format!("Import '{imp}' is forbidden"));
            continue;
        }
        if !config.allowed_imports.contains(imp) {
            let risk = import_risk(imp);
            if risk > 0.5 {
                violations.push(format!("import '{imp}' not in allowed list (risk={risk:.1})"));
            }
            import_risk_total += risk;
        } else {
            import_risk_total += whitelisted_import_risk(imp);
        }
    }
    let import_threshold = entropy_budget * config.max_import_risk;
    if import_risk_total > import_threshold && violations.is_empty() {
        violations.push(format!(
            "total import risk ({import_risk_total:.2}) exceeds threshold ({import_threshold:.2})"
        ));
    }

    // Indentation-tracked block scan, shared by passes 3-5.
    let mut stack: Vec<Block> = Vec::new();
    let mut loop_stack_depth = 0u32;
    let mut max_nesting_depth = 0u32;
    let mut max_loop_depth = 0u32;
    let mut complexity = 1u32;
    let mut function_lines: Vec<usize> = Vec::new();
    let mut function_names: Vec<String> = Vec::new();
    let def_re = Regex::new(r"^(?:async\s+)?def\s+(\w+)").unwrap();
    let while_true_re = Regex::new(r"^while\s+True\s*:").unwrap();

    for (i, raw) in lines.iter().enumerate() {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let indent = indent_of(raw);

        while let Some(top) = stack.last() {
            if indent <= top.indent {
                let popped = stack.pop().unwrap();
                if popped.kind == BlockKind::Loop {
                    loop_stack_depth = loop_stack_depth.saturating_sub(1);
                }
            } else {
                break;
            }
        }

        complexity += trimmed.matches(" and ").count() as u32;
        complexity += trimmed.matches(" or ").count() as u32;
        if trimmed.contains(" if ") && trimmed.contains(" else ") && !trimmed.starts_with("if ") {
            complexity += 1; // ternary
        }

        if let Some(caps) = def_re.captures(trimmed) {
            function_names.push(caps[1].to_string());
            function_lines.push(i);
            complexity += 0;
        } else if trimmed.starts_with("if ") || trimmed.starts_with("elif ") {
            complexity += 1;
        } else if starts_with_any(trimmed, &["for ", "while "]) {
            complexity += 1;
        } else if trimmed == "try" || trimmed.starts_with("try:") {
            // try itself isn't a decision point; except is.
        } else if trimmed.starts_with("except") {
            complexity += 1;
        } else if starts_with_any(trimmed, &["with "]) {
            complexity += 1;
        }

        if is_block_header(trimmed) && starts_with_any(trimmed, NESTING_KEYWORDS) {
            let is_loop = starts_with_any(trimmed, LOOP_KEYWORDS);
            stack.push(Block { indent, kind: if is_loop { BlockKind::Loop } else { BlockKind::Other } });
            max_nesting_depth = max_nesting_depth.max(stack.len() as u32);
            if is_loop {
                loop_stack_depth += 1;
                max_loop_depth = max_loop_depth.max(loop_stack_depth);
            }
        }
    }

    // Pass 4: branching factor — per function, the larger of its return
    // count and its widest if/elif/else chain; take the max across units.
    let branching = estimate_branching_factor(&lines);

    let complexity_threshold = (entropy_budget * config.max_cyclomatic_complexity as f32) as u32;
    if complexity > complexity_threshold {
        violations.push(format!("cyclomatic complexity ({complexity}) exceeds threshold ({complexity_threshold})"));
    }

    let branching_threshold = (entropy_budget * config.max_branching_factor as f32) as u32;
    if branching > branching_threshold && branching > 1 {
        violations.push(format!("branching factor ({branching}) exceeds threshold ({branching_threshold})"));
    }

    // Pass 5: unbounded recursion.
    let has_unbounded = has_unbounded_while_true(&lines, &while_true_re) || has_unguarded_recursion(&lines, &function_names);
    if has_unbounded {
        violations.push("unbounded recursion detected".to_string());
    }

    let estimated_runtime = match max_loop_depth {
        0 => "O(1)",
        1 => "O(n)",
        2 => "O(n^2)",
        3 => "O(n^3)",
        _ => "unbounded",
    }
    .to_string();

    StabilityResult {
        is_stable: violations.is_empty(),
        metrics: StabilityMetrics {
            cyclomatic_complexity: complexity,
            branching_factor: branching,
            import_risk: import_risk_total,
            has_unbounded_recursion: has_unbounded,
            estimated_runtime,
            import_count: imports.len() as u32,
            function_count: function_names.len() as u32,
            max_nesting_depth,
        },
        violations,
    }
}

fn extract_imports(source: &str) -> Vec<String> {
    let import_re = Regex::new(r"^\s*import\s+([\w.]+)").unwrap();
    let from_re = Regex::new(r"^\s*from\s+([\w.]+)\s+import\b").unwrap();
    let mut out = Vec::new();
    for line in source.lines() {
        if let Some(caps) = import_re.captures(line) {
            out.push(caps[1].split('.').next().unwrap().to_string());
        } else if let Some(caps) = from_re.captures(line) {
            out.push(caps[1].split('.').next().unwrap().to_string());
        }
    }
    out
}

fn estimate_branching_factor(lines: &[&str]) -> u32 {
    let mut max_branches = 1u32;
    let mut chain_len = 0u32;
    for line in lines {
        let trimmed = line.trim();
        if trimmed.starts_with("if ") {
            chain_len = 1;
        } else if trimmed.starts_with("elif ") || trimmed == "else" || trimmed.starts_with("else:") {
            chain_len += 1;
            max_branches = max_branches.max(chain_len);
        }
    }

    let mut in_function = false;
    let mut function_indent = 0usize;
    let mut returns = 0u32;
    for raw in lines {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        let indent = indent_of(raw);
        if trimmed.starts_with("def ") || trimmed.starts_with("async def ") {
            if in_function {
                max_branches = max_branches.max(returns.max(1));
            }
            in_function = true;
            function_indent = indent;
            returns = 0;
            continue;
        }
        if in_function && indent <= function_indent {
            max_branches = max_branches.max(returns.max(1));
            in_function = false;
        }
        if in_function && trimmed.starts_with("return") {
            returns += 1;
        }
    }
    if in_function {
        max_branches = max_branches.max(returns.max(1));
    }

    max_branches
}

fn has_unbounded_while_true(lines: &[&str], while_true_re: &Regex) -> bool {
    for (i, raw) in lines.iter().enumerate() {
        let trimmed = raw.trim();
        if !while_true_re.is_match(trimmed) {
            continue;
        }
        let header_indent = indent_of(raw);
        let mut has_break = false;
        for body in lines.iter().skip(i + 1) {
            if body.trim().is_empty() {
                continue;
            }
            let body_indent = indent_of(body);
            if body_indent <= header_indent {
                break;
            }
            if body.trim() == "break" || body.trim().starts_with("break") {
                has_break = true;
                break;
            }
        }
        if !has_break {
            return true;
        }
    }
    false
}

fn has_unguarded_recursion(lines: &[&str], function_names: &[String]) -> bool {
    let mut recursive_without_base_case: HashSet<String> = HashSet::new();
    let def_re = Regex::new(r"^(?:async\s+)?def\s+(\w+)").unwrap();

    for (i, raw) in lines.iter().enumerate() {
        let trimmed = raw.trim();
        let Some(caps) = def_re.captures(trimmed) else { continue };
        let name = &caps[1];
        if !function_names.contains(&name.to_string()) {
            continue;
        }
        let header_indent = indent_of(raw);
        let mut body: Vec<&str> = Vec::new();
        for line in lines.iter().skip(i + 1) {
            if line.trim().is_empty() {
                continue;
            }
            if indent_of(line) <= header_indent {
                break;
            }
            body.push(line);
        }

        let calls_self = body.iter().any(|l| l.contains(&format!("{name}(")));
        if !calls_self {
            continue;
        }

        let has_base_case = body.iter().enumerate().take(3).any(|(j, l)| {
            let t = l.trim();
            if t.starts_with("return") {
                return true;
            }
            if t.starts_with("if ") {
                let if_indent = indent_of(l);
                return body[j + 1..]
                    .iter()
                    .take_while(|sub| indent_of(sub) > if_indent)
                    .any(|sub| sub.trim().starts_with("return"));
            }
            false
        });
        if !has_base_case {
            recursive_without_base_case.insert(name.to_string());
        }
    }

    !recursive_without_base_case.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_is_unstable() {
        let result = analyze_stability("", 1.0, &StabilityConfig::default());
        assert!(!result.is_stable);
    }

    #[test]
    fn forbidden_import_fails_immediately() {
        let src = "import os\n\ndef run():\n    return os.getcwd()\n";
        let result = analyze_stability(src, 1.0, &StabilityConfig::default());
        assert!(!result.is_stable);
        assert!(result.violations.iter().any(|v| v.contains("forbidden")));
    }

    #[test]
    fn plain_function_is_stable() {
        let src = "def add(a, b):\n    return a + b\n";
        let result = analyze_stability(src, 1.0, &StabilityConfig::default());
        assert!(result.is_stable, "{:?}", result.violations);
        assert_eq!(result.metrics.function_count, 1);
    }

    #[test]
    fn while_true_without_break_is_unbounded() {
        let src = "def spin():\n    while True:\n        pass\n";
        let result = analyze_stability(src, 1.0, &StabilityConfig::default());
        assert!(!result.is_stable);
        assert!(result.metrics.has_unbounded_recursion);
    }

    #[test]
    fn while_true_with_break_is_allowed() {
        let src = "def spin():\n    while True:\n        if done():\n            break\n";
        let result = analyze_stability(src, 1.0, &StabilityConfig::default());
        assert!(!result.metrics.has_unbounded_recursion);
    }

    #[test]
    fn recursive_function_with_early_return_is_allowed() {
        let src = "def fact(n):\n    if n <= 1:\n        return 1\n    return n * fact(n - 1)\n";
        let result = analyze_stability(src, 1.0, &StabilityConfig::default());
        assert!(!result.metrics.has_unbounded_recursion);
    }

    #[test]
    fn recursive_function_without_base_case_is_unbounded() {
        let src = "def loopy(n):\n    print(n)\n    print(loopy(n + 1))\n";
        let result = analyze_stability(src, 1.0, &StabilityConfig::default());
        assert!(result.metrics.has_unbounded_recursion);
    }

    #[test]
    fn nested_loops_estimate_quadratic_runtime() {
        let src = "def pairs(xs):\n    for x in xs:\n        for y in xs:\n            yield (x, y)\n";
        let result = analyze_stability(src, 1.0, &StabilityConfig::default());
        assert_eq!(result.metrics.estimated_runtime, "O(n^2)");
    }

    #[test]
    fn excess_complexity_is_rejected_at_low_budget() {
        let src = "def f(x):\n    if x:\n        pass\n    if x:\n        pass\n    if x:\n        pass\n";
        let result = analyze_stability(src, 0.05, &StabilityConfig::default());
        assert!(!result.is_stable);
    }
}
