//! The shipped specs and prompts must load and compose cleanly

use super::common::project_root;
use pattern_discovery::analyzer::SERVICE_COLLABORATION_SPEC;
use pattern_discovery::composer::service_collaboration_prompt;
use pattern_discovery::store::SpecStore;
use pattern_discovery_sdk::{AnalysisCategory, CODE_PATH_PLACEHOLDER};
use std::path::Path;

#[test]
fn test_every_category_has_a_valid_spec() {
    let store = SpecStore::new(project_root());
    for category in AnalysisCategory::ALL {
        let spec = store.spec_for(category).unwrap();
        assert!(spec.validate().is_ok(), "{} spec is invalid", category);
        assert!(!spec.patterns.is_empty());
    }
}

#[test]
fn test_every_prompt_has_one_placeholder() {
    let store = SpecStore::new(project_root());
    for category in AnalysisCategory::ALL {
        let prompt = store.prompt_for(category).unwrap();
        assert_eq!(
            prompt.matches(CODE_PATH_PLACEHOLDER).count(),
            1,
            "{} prompt",
            category.prompt_file()
        );
    }
}

#[test]
fn test_every_listed_spec_loads() {
    let store = SpecStore::new(project_root());
    let paths = store.all_spec_paths().unwrap();
    assert!(paths.len() >= 4);
    for path in paths {
        store.load_spec(&path).unwrap();
    }
}

#[test]
fn test_catalogue_lists_main_specs_first() {
    let store = SpecStore::new(project_root());
    let entries = store.list_specs().unwrap();

    assert_eq!(entries[0].file, "algorithms-data-structures-spec.yaml");
    assert_eq!(entries[0].group, "Main");
    let service = entries
        .iter()
        .find(|e| e.file == "service-collaboration-patterns.yaml")
        .unwrap();
    assert_eq!(service.group, "Service Collaboration");
}

#[test]
fn test_service_collaboration_prompt_names_every_pattern() {
    let store = SpecStore::new(project_root());
    let spec = store.load_spec(SERVICE_COLLABORATION_SPEC).unwrap();
    let prompt = service_collaboration_prompt(&spec, Path::new("/srv/shop"));

    for name in spec.pattern_names() {
        assert!(prompt.contains(name), "missing {}", name);
    }
    assert!(prompt.contains("Saga"));
    assert!(prompt.contains("API Composition"));
}
