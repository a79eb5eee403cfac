//! Prompt composition
//!
//! Turns prompt templates into the text handed to the external tool.

use pattern_discovery_sdk::{AnalysisCategory, SpecFile, CODE_PATH_PLACEHOLDER};
use std::path::Path;

/// Substitute the target path into a single template
///
/// `str::replace` is single-pass, so a target path that itself contains the
/// placeholder is never expanded a second time. Templates without a
/// placeholder get a `Target:` header instead.
pub fn compose(template: &str, target: &Path) -> String {
    let target = target.display().to_string();

    if template.contains(CODE_PATH_PLACEHOLDER) {
        template.replace(CODE_PATH_PLACEHOLDER, &target)
    } else {
        format!("Target: {}\n\n{}", target, template)
    }
}

/// Concatenate several templates into one prompt for a single session
///
/// Sections appear in the order given, each with its full template text.
pub fn compose_chain(sections: &[(AnalysisCategory, String)], target: &Path) -> String {
    let mut prompt = format!(
        "I want you to analyze the codebase at {} for multiple pattern types in sequence.\n\
         Please provide a comprehensive analysis covering all requested patterns.\n\n\
         Please analyze the following patterns in order:\n",
        target.display()
    );

    for (idx, (category, template)) in sections.iter().enumerate() {
        prompt.push_str(&format!(
            "\n\n{}. {} Analysis:\n{}\n\n---\n",
            idx + 1,
            category.title(),
            compose_section(template, target)
        ));
    }

    prompt.push_str(
        "\n\nPlease provide a comprehensive report with:\n\
         1. Executive summary of all patterns found\n\
         2. Detailed analysis for each pattern type\n\
         3. Cross-pattern relationships and interactions\n\
         4. Overall architecture assessment\n\
         5. Prioritized recommendations for improvement\n\n\
         Format the response with clear sections and use markdown for better readability.\n",
    );

    prompt
}

/// Build the service collaboration scan prompt from its spec
pub fn service_collaboration_prompt(spec: &SpecFile, target: &Path) -> String {
    let pattern_list = spec.pattern_names().join(", ");

    let mut prompt = format!(
        "# Service Collaboration Scan\n\n\
         Analyze the codebase at {} for service collaboration patterns.\n\n\
         Supported patterns: {}.\n\n",
        target.display(),
        pattern_list
    );

    for pattern in &spec.patterns {
        prompt.push_str(&format!("## {}\n", pattern.name));
        if let Some(description) = &pattern.description {
            prompt.push_str(&format!("{}\n", description.trim()));
        }
        prompt.push_str("Look for:\n");
        for hint in &pattern.detection_hints {
            prompt.push_str(&format!("- {}\n", hint));
        }
        prompt.push_str(&format!("Report: {}\n\n", pattern.report_fields.join(", ")));
    }

    prompt.push_str("For each detected pattern provide file locations (file:line) and an assessment of the implementation.\n");
    prompt
}

// Sections inside a chain already name the target in the header, so a
// placeholder-free template is included verbatim.
fn compose_section(template: &str, target: &Path) -> String {
    if template.contains(CODE_PATH_PLACEHOLDER) {
        compose(template, target)
    } else {
        template.to_string()
    }
}
