//! End-to-end tests of the projection service.
//!
//! A scripted synthesizer stands in for the real provider: it writes
//! predictable prose, records the calls it receives, and can be told to
//! fail so the deterministic fallbacks are exercised.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use memoir_projections_core::context::{DiscoveredTheme, ThemeExtraction};
use memoir_projections_core::history::{PROJECTION_HISTORY_CAPACITY, SECTION_HISTORY_CAPACITY};
use memoir_projections_core::models::{ContentItem, ContentPayload};
use memoir_projections_core::projection::{DocumentProjection, ProjectionConfig, ProjectionStyle, UpdateMode};
use memoir_projections_core::section::{ProjectedSection, SectionState, VersionTrigger};
use memoir_projections_core::store::memory::InMemoryStore;
use memoir_projections_core::synthesis::{GenerateRequest, GeneratedSection, IntegrateRequest, Synthesizer};
use memoir_projections::engine::ProjectionEngine;
use memoir_projections::service::ProjectionService;
use memoir_projections::strategy::APPEND_SEPARATOR;

// ─── Scripted synthesizer ───────────────────────────────────────────

#[derive(Default)]
struct Scripted {
    fail: bool,
    /// `(keyword, theme)`: a theme is reported when its keyword occurs.
    theme_rules: Vec<(&'static str, &'static str)>,
    generate_calls: AtomicUsize,
    narratives: Mutex<Vec<String>>,
    integrations: Mutex<Vec<IntegrateRequest>>,
    extracted: Mutex<Vec<String>>,
}

impl Scripted {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn with_themes(rules: &[(&'static str, &'static str)]) -> Self {
        Self {
            theme_rules: rules.to_vec(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Synthesizer for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GeneratedSection> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        self.narratives.lock().unwrap().push(request.narrative_context.clone());
        if self.fail {
            bail!("scripted failure");
        }
        Ok(GeneratedSection {
            content: format!("[{}] {}", request.topic, request.texts.join(" | ")),
            summary: format!("about {}", request.topic),
        })
    }

    async fn integrate(&self, request: &IntegrateRequest) -> Result<String> {
        self.integrations.lock().unwrap().push(request.clone());
        if self.fail {
            bail!("scripted failure");
        }
        Ok(format!("{} [+] {}", request.existing_content, request.new_texts.join(" | ")))
    }

    async fn extract_themes(&self, raw_text: &str, _existing: &[String]) -> Result<ThemeExtraction> {
        self.extracted.lock().unwrap().push(raw_text.to_string());
        if self.fail {
            bail!("scripted failure");
        }
        let themes = self
            .theme_rules
            .iter()
            .filter(|(keyword, _)| raw_text.contains(keyword))
            .map(|(_, theme)| DiscoveredTheme::new(*theme).with_strength(0.5))
            .collect();
        Ok(ThemeExtraction {
            themes,
            ..Default::default()
        })
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

fn service(synth: Arc<Scripted>) -> ProjectionService {
    let store = Arc::new(InMemoryStore::new());
    ProjectionService::new(store.clone(), store, ProjectionEngine::new(synth, 4))
}

fn item(id: &str, contributor: &str, text: &str) -> ContentItem {
    ContentItem::new(
        id,
        "p1",
        contributor,
        ContentPayload::Text {
            text: text.to_string(),
        },
    )
}

fn thematic(titles: &[&str]) -> ProjectionConfig {
    ProjectionConfig {
        style: ProjectionStyle::Thematic,
        suggested_sections: Some(titles.iter().map(|s| s.to_string()).collect()),
        ..Default::default()
    }
}

fn by_title<'a>(proj: &'a DocumentProjection, title: &str) -> &'a ProjectedSection {
    proj.section_by_title(title)
        .unwrap_or_else(|| panic!("no section titled {}", title))
}

// ─── Scenarios ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_locked_section_survives_evolve() {
    let svc = service(Arc::new(Scripted::default()));
    svc.add_content(item("c1", "u1", "We lived on a farm.")).await.unwrap();

    let proj = svc
        .create_projection("p1", "Memoir", thematic(&["Family"]))
        .await
        .unwrap();
    assert_eq!(proj.sections().len(), 1);
    let family = by_title(&proj, "Family");
    assert_eq!(family.state(), SectionState::Generated);
    assert_eq!(family.version(), 1);
    let section_id = family.id.clone();
    let content_before = family.content().to_string();

    svc.lock_section(&proj.id, &section_id, "editor", "approved")
        .await
        .unwrap();

    let added = svc.add_content(item("c2", "u1", "Dad drove the tractor.")).await.unwrap();
    assert!(added.added);
    assert_eq!(added.stale_projection_ids, vec![proj.id.clone()]);

    let options = svc.update_options(&proj.id).await.unwrap();
    assert_eq!(options.stale_section_count, 0);
    assert!(options.has_new_content);
    assert_eq!(options.new_content_count, 1);
    assert_eq!(options.locked_section_ids, vec![section_id.clone()]);

    let (updated, report) = svc.update(&proj.id, Some(UpdateMode::Evolve), None).await.unwrap();
    let family = updated.section(&section_id).unwrap();
    assert_eq!(family.content(), content_before);
    assert_eq!(family.version(), 1);
    assert!(family.is_locked());
    assert_eq!(updated.version(), proj.version() + 1);
    assert!(report.updated_section_ids.is_empty());
    assert_eq!(report.new_content_count, 1);
}

#[tokio::test]
async fn test_context_absorbs_only_new_content_before_synthesis() {
    let synth = Arc::new(Scripted::with_themes(&[("farm", "Family"), ("tractor", "Machines")]));
    let svc = service(synth.clone());
    svc.add_content(item("c1", "u1", "We lived on a farm.")).await.unwrap();
    let proj = svc
        .create_projection("p1", "Memoir", thematic(&["Home"]))
        .await
        .unwrap();
    assert_eq!(proj.context.theme_names(), vec!["Family"]);

    svc.add_content(item("c2", "u1", "Dad drove the tractor on the farm.")).await.unwrap();
    synth.narratives.lock().unwrap().clear();
    let (proj, report) = svc.update(&proj.id, Some(UpdateMode::Refresh), None).await.unwrap();
    assert_eq!(report.new_content_count, 1);

    let extracted = synth.extracted.lock().unwrap().clone();
    assert_eq!(
        extracted,
        vec!["We lived on a farm.".to_string(), "Dad drove the tractor on the farm.".to_string()]
    );

    let family = &proj.context.themes[0];
    assert_eq!(family.theme, "Family");
    assert!((family.strength - 0.6).abs() < 1e-6);
    assert_eq!(family.source_content_ids, vec!["c1".to_string(), "c2".to_string()]);
    let machines = &proj.context.themes[1];
    assert_eq!(machines.theme, "Machines");
    assert_eq!(machines.source_content_ids, vec!["c2".to_string()]);

    // The refreshed section was written with the already-updated context.
    let narratives = synth.narratives.lock().unwrap().clone();
    assert_eq!(narratives.len(), 1);
    assert!(narratives[0].contains("Machines"));
}

#[tokio::test]
async fn test_refresh_touches_only_stale_sections() {
    let svc = service(Arc::new(Scripted::default()));
    svc.add_content(item("c1", "u1", "First memory.")).await.unwrap();
    let proj = svc
        .create_projection("p1", "Memoir", thematic(&["Childhood", "Career"]))
        .await
        .unwrap();
    let childhood = by_title(&proj, "Childhood").id.clone();
    let career = by_title(&proj, "Career").id.clone();

    svc.add_content(item("c2", "u1", "Second memory.")).await.unwrap();

    // Bring only Childhood up to date; Career stays stale.
    let scope = vec![childhood.clone()];
    let (proj, _) = svc
        .update(&proj.id, Some(UpdateMode::Refresh), Some(&scope))
        .await
        .unwrap();
    assert_eq!(proj.section(&childhood).unwrap().version(), 2);
    assert_eq!(proj.section(&career).unwrap().version(), 1);

    let options = svc.update_options(&proj.id).await.unwrap();
    assert_eq!(options.stale_section_ids, vec![career.clone()]);

    let (proj, report) = svc.update(&proj.id, Some(UpdateMode::Refresh), None).await.unwrap();
    assert_eq!(report.updated_section_ids, vec![career.clone()]);
    assert_eq!(proj.section(&childhood).unwrap().version(), 2);
    let career_section = proj.section(&career).unwrap();
    assert_eq!(career_section.version(), 2);
    assert_eq!(career_section.trigger(), VersionTrigger::Refresh);

    let current = proj.content_snapshot_ids().to_vec();
    assert!(proj.sections().iter().all(|s| !s.is_stale(&current)));
    assert_eq!(svc.update_options(&proj.id).await.unwrap().stale_section_count, 0);
}

#[tokio::test]
async fn test_no_mode_touches_locked_sections() {
    let svc = service(Arc::new(Scripted::default()));
    svc.add_content(item("c1", "u1", "Seed memory.")).await.unwrap();
    let proj = svc
        .create_projection("p1", "Memoir", thematic(&["Family", "Career"]))
        .await
        .unwrap();
    let family = by_title(&proj, "Family").id.clone();
    let career = by_title(&proj, "Career").id.clone();
    svc.lock_section(&proj.id, &family, "editor", "approved").await.unwrap();
    let locked = svc.get_projection(&proj.id).await.unwrap().section(&family).unwrap().clone();

    let modes = [
        UpdateMode::Regenerate,
        UpdateMode::Evolve,
        UpdateMode::Refresh,
        UpdateMode::Append,
    ];
    for (i, mode) in modes.into_iter().enumerate() {
        svc.add_content(item(&format!("n{}", i), "u2", &format!("New memory {}.", i)))
            .await
            .unwrap();
        let (proj, _) = svc.update(&proj.id, Some(mode), None).await.unwrap();

        let after = proj.section(&family).unwrap();
        assert_eq!(after.content(), locked.content(), "{} changed locked content", mode);
        assert_eq!(after.summary(), locked.summary(), "{} changed locked summary", mode);
        assert_eq!(after.version(), locked.version(), "{} bumped locked version", mode);
        assert!(after.is_locked());

        assert_eq!(proj.section(&career).unwrap().version(), i as u32 + 2);
    }
}

#[tokio::test]
async fn test_evolve_integrates_only_new_content() {
    let synth = Arc::new(Scripted::default());
    let svc = service(synth.clone());
    svc.add_content(item("c1", "u1", "Old memory.")).await.unwrap();
    let proj = svc
        .create_projection("p1", "Memoir", thematic(&["Family"]))
        .await
        .unwrap();
    let id = by_title(&proj, "Family").id.clone();
    let original = by_title(&proj, "Family").content().to_string();

    svc.add_content(item("c2", "u2", "New memory.")).await.unwrap();
    let (proj, report) = svc.update(&proj.id, Some(UpdateMode::Evolve), None).await.unwrap();

    let calls = synth.integrations.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].new_texts, vec!["New memory."]);
    assert_eq!(calls[0].existing_content, original);

    let section = proj.section(&id).unwrap();
    assert_eq!(section.content(), format!("{} [+] New memory.", original));
    assert_eq!(section.version(), 2);
    assert_eq!(section.trigger(), VersionTrigger::Evolution);
    assert_eq!(section.contributor_ids(), &["u1".to_string(), "u2".to_string()]);
    assert_eq!(section.history().len(), 1);
    assert_eq!(section.history().latest().unwrap().trigger, VersionTrigger::Generation);
    assert_eq!(report.updated_section_ids, vec![id]);
}

#[tokio::test]
async fn test_append_keeps_prior_prose() {
    let svc = service(Arc::new(Scripted::default()));
    svc.add_content(item("c1", "u1", "Old memory.")).await.unwrap();
    let proj = svc
        .create_projection("p1", "Memoir", thematic(&["Family"]))
        .await
        .unwrap();
    let original = by_title(&proj, "Family").content().to_string();

    svc.add_content(item("c2", "u1", "New memory.")).await.unwrap();
    let (proj, _) = svc.update(&proj.id, Some(UpdateMode::Append), None).await.unwrap();

    let section = by_title(&proj, "Family");
    let expected = format!(
        "{}{}[additional content for Family] New memory.",
        original, APPEND_SEPARATOR
    );
    assert_eq!(section.content(), expected);
    assert_eq!(section.trigger(), VersionTrigger::Append);
    assert_eq!(section.source_content_ids(), &["c1".to_string(), "c2".to_string()]);
}

#[tokio::test]
async fn test_failing_synthesizer_falls_back() {
    let synth = Arc::new(Scripted::failing());
    let svc = service(synth.clone());
    svc.add_content(item("c1", "u1", "I grew up on a farm in Iowa."))
        .await
        .unwrap();

    let proj = svc
        .create_projection("p1", "Memoir", thematic(&["Childhood"]))
        .await
        .unwrap();
    let section = by_title(&proj, "Childhood");
    assert_eq!(section.state(), SectionState::Generated);
    assert!(section
        .content()
        .starts_with("*[standard section about \"Childhood\"]*"));
    assert!(section.content().contains("Based on 1 content item."));
    assert!(section.content().contains("I grew up on a farm in Iowa."));

    svc.add_content(item("c2", "u1", "Then we moved to town.")).await.unwrap();
    let (updated, report) = svc.update(&proj.id, Some(UpdateMode::Evolve), None).await.unwrap();
    assert_eq!(report.updated_section_ids.len(), 1);
    assert_eq!(updated.version(), proj.version() + 1);
    let section = by_title(&updated, "Childhood");
    assert!(section.content().contains("*[New content integrated:]*"));
    assert!(section.content().contains("Then we moved to town."));
    assert!(synth.generate_calls.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_histories_stay_bounded_and_revert_round_trips() {
    let svc = service(Arc::new(Scripted::default()));
    svc.add_content(item("c0", "u1", "Memory 0.")).await.unwrap();
    let proj = svc
        .create_projection("p1", "Memoir", thematic(&["Family"]))
        .await
        .unwrap();
    let id = by_title(&proj, "Family").id.clone();

    for i in 1..=25 {
        svc.add_content(item(&format!("c{}", i), "u1", &format!("Memory {}.", i)))
            .await
            .unwrap();
        let (proj, _) = svc
            .update(&proj.id, Some(UpdateMode::Regenerate), None)
            .await
            .unwrap();
        let section = proj.section(&id).unwrap();
        assert_eq!(section.version(), i + 1);
        assert!(section.history().len() <= SECTION_HISTORY_CAPACITY);
        assert!(proj.version_history().len() <= PROJECTION_HISTORY_CAPACITY);
    }

    let proj = svc.get_projection(&proj.id).await.unwrap();
    assert_eq!(proj.version(), 27);
    let history = svc.section_history(&proj.id, &id).await.unwrap();
    assert_eq!(history.len(), SECTION_HISTORY_CAPACITY);
    assert_eq!(history.first().unwrap().version, 16);
    assert_eq!(history.last().unwrap().version, 25);

    let target = history.iter().find(|h| h.version == 20).unwrap().clone();
    svc.revert_section(&proj.id, &id, 20).await.unwrap();
    let proj = svc.get_projection(&proj.id).await.unwrap();
    let section = proj.section(&id).unwrap();
    assert_eq!(section.content(), target.content);
    assert_eq!(section.summary(), target.summary);
    assert_eq!(section.source_content_ids(), &target.source_content_ids[..]);
    assert_eq!(section.version(), 27);
    assert_eq!(section.trigger(), VersionTrigger::Revert);

    let err = svc.revert_section(&proj.id, &id, 3).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_updates_are_serialized() {
    let svc = Arc::new(service(Arc::new(Scripted::default())));
    svc.add_content(item("c1", "u1", "Memory.")).await.unwrap();
    let proj = svc
        .create_projection("p1", "Memoir", thematic(&["Family", "Career"]))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let svc = svc.clone();
        let id = proj.id.clone();
        handles.push(tokio::spawn(async move {
            svc.update(&id, Some(UpdateMode::Regenerate), None).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let proj = svc.get_projection(&proj.id).await.unwrap();
    assert_eq!(proj.version(), 10);
    let versions: Vec<u32> = proj.version_history().iter().map(|v| v.version).collect();
    assert_eq!(versions, (1..10).collect::<Vec<_>>());
    for section in proj.sections() {
        assert_eq!(section.version(), 9);
    }
}

#[tokio::test]
async fn test_by_contributor_sections_stay_scoped() {
    let svc = service(Arc::new(Scripted::default()));
    svc.add_content(item("c1", "alice-0001", "Alice remembers the lake.")).await.unwrap();
    svc.add_content(item("c2", "bob-00002", "Bob remembers the war.")).await.unwrap();

    let config = ProjectionConfig {
        style: ProjectionStyle::ByContributor,
        ..Default::default()
    };
    let proj = svc.create_projection("p1", "Voices", config).await.unwrap();
    assert_eq!(proj.sections().len(), 2);
    let alice = proj.sections()[0].clone();
    let bob = proj.sections()[1].clone();
    assert_eq!(alice.title, "From Contributor alice-00");
    assert_eq!(alice.primary_contributor_id(), Some("alice-0001"));
    assert_eq!(alice.source_content_ids(), &["c1".to_string()]);
    assert_eq!(
        alice.content(),
        "[contributions from alice-0001] Alice remembers the lake."
    );
    assert_eq!(bob.source_content_ids(), &["c2".to_string()]);

    svc.add_content(item("c3", "alice-0001", "Alice learned to swim.")).await.unwrap();
    let (proj, report) = svc.update(&proj.id, Some(UpdateMode::Evolve), None).await.unwrap();

    assert_eq!(report.updated_section_ids, vec![alice.id.clone()]);
    assert_eq!(report.acknowledged_count, 1);
    let bob_after = proj.section(&bob.id).unwrap();
    assert_eq!(bob_after.version(), 1);
    assert_eq!(bob_after.content(), bob.content());
    assert!(!bob_after.is_stale(proj.content_snapshot_ids()));
    assert!(proj
        .section(&alice.id)
        .unwrap()
        .content()
        .ends_with("[+] Alice learned to swim."));
}

#[tokio::test]
async fn test_chronological_projection() {
    let svc = service(Arc::new(Scripted::default()));
    let empty = svc
        .create_projection(
            "p1",
            "Story",
            ProjectionConfig {
                style: ProjectionStyle::Chronological,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(empty.sections().is_empty());

    svc.add_content(item("c1", "u1", "Born in 1950.")).await.unwrap();
    svc.add_content(item("c2", "u2", "Married in 1975.")).await.unwrap();
    let proj = svc
        .create_projection(
            "p1",
            "Story",
            ProjectionConfig {
                style: ProjectionStyle::Chronological,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(proj.sections().len(), 1);
    let story = &proj.sections()[0];
    assert_eq!(story.title, "The Story");
    assert_eq!(
        story.content(),
        "[chronological narrative] Born in 1950. | Married in 1975."
    );
}

#[tokio::test]
async fn test_filters_limit_relevant_content() {
    let svc = service(Arc::new(Scripted::default()));
    svc.add_content(item("c1", "u1", "Tagged by u1.").with_tags(&["family"]))
        .await
        .unwrap();
    svc.add_content(item("c2", "u2", "Tagged by u2.").with_tags(&["family"]))
        .await
        .unwrap();
    svc.add_content(item("c3", "u1", "Untagged.")).await.unwrap();

    let mut config = thematic(&["Family"]);
    config.contributor_filter = Some(vec!["u1".into()]);
    config.tag_filter = Some(vec!["family".into()]);
    let proj = svc.create_projection("p1", "Filtered", config).await.unwrap();

    assert_eq!(proj.content_snapshot_ids(), &["c1".to_string()]);
    assert_eq!(by_title(&proj, "Family").content(), "[Family] Tagged by u1.");
}

#[tokio::test]
async fn test_auto_update_on_content() {
    let svc = service(Arc::new(Scripted::default()));
    svc.add_content(item("c1", "u1", "First.")).await.unwrap();

    let mut config = thematic(&["Family"]);
    config.auto_update_on_content = true;
    config.default_update_mode = UpdateMode::Append;
    let auto = svc.create_projection("p1", "Auto", config).await.unwrap();
    let manual = svc
        .create_projection("p1", "Manual", thematic(&["Family"]))
        .await
        .unwrap();

    let added = svc.add_content(item("c2", "u1", "Second.")).await.unwrap();
    assert_eq!(added.auto_updates.len(), 1);
    assert_eq!(added.auto_updates[0].projection_id, auto.id);
    assert_eq!(added.auto_updates[0].mode, UpdateMode::Append);
    assert_eq!(added.stale_projection_ids, vec![manual.id.clone()]);

    let auto = svc.get_projection(&auto.id).await.unwrap();
    assert!(by_title(&auto, "Family").content().contains(APPEND_SEPARATOR));

    let again = svc.add_content(item("c2", "u1", "Second.")).await.unwrap();
    assert!(!again.added);
    assert!(again.auto_updates.is_empty());
}

#[tokio::test]
async fn test_edit_lock_and_unlock_through_service() {
    let svc = service(Arc::new(Scripted::default()));
    svc.add_content(item("c1", "u1", "Memory.")).await.unwrap();
    let proj = svc
        .create_projection("p1", "Memoir", thematic(&["Family"]))
        .await
        .unwrap();
    let id = by_title(&proj, "Family").id.clone();

    svc.start_editing(&proj.id, &id).await.unwrap();
    let draft = svc.get_projection(&proj.id).await.unwrap();
    assert_eq!(draft.section(&id).unwrap().state(), SectionState::Draft);
    let (after, _) = svc.update(&proj.id, Some(UpdateMode::Regenerate), None).await.unwrap();
    assert_eq!(after.section(&id).unwrap().version(), 1);

    svc.edit_section(&proj.id, &id, "Hand written.".into(), true, Some("editor"))
        .await
        .unwrap();
    let (after, _) = svc.update(&proj.id, Some(UpdateMode::Regenerate), None).await.unwrap();
    let section = after.section(&id).unwrap();
    assert_eq!(section.content(), "Hand written.");
    assert_eq!(section.trigger(), VersionTrigger::ManualEdit);
    assert_eq!(section.lock_info().unwrap().locked_by, "editor");

    assert!(svc.start_editing(&proj.id, &id).await.is_err());
    svc.unlock_section(&proj.id, &id).await.unwrap();
    let (after, _) = svc.update(&proj.id, Some(UpdateMode::Regenerate), None).await.unwrap();
    assert_eq!(after.section(&id).unwrap().content(), "[Family] Memory.");
    assert_eq!(after.section(&id).unwrap().version(), 3);
}

#[tokio::test]
async fn test_unknown_ids_are_not_found() {
    let svc = service(Arc::new(Scripted::default()));
    assert!(svc.get_projection("doc_missing").await.unwrap_err().is_not_found());

    svc.add_content(item("c1", "u1", "Memory.")).await.unwrap();
    let proj = svc
        .create_projection("p1", "Memoir", thematic(&["Family"]))
        .await
        .unwrap();
    let scope = vec!["sec_missing".to_string()];
    let err = svc
        .update(&proj.id, Some(UpdateMode::Regenerate), Some(&scope))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(svc.get_projection(&proj.id).await.unwrap().version(), proj.version());
    assert!(svc.lock_section(&proj.id, "sec_missing", "u", "r").await.unwrap_err().is_not_found());
}

// ─── Cancellation ───────────────────────────────────────────────────

/// Generates instantly until `stall` is set, then never finishes in time.
#[derive(Default)]
struct Stalling {
    stall: AtomicBool,
}

#[async_trait]
impl Synthesizer for Stalling {
    fn name(&self) -> &str {
        "stalling"
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GeneratedSection> {
        if self.stall.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        Ok(GeneratedSection {
            content: format!("[{}] {}", request.topic, request.texts.join(" | ")),
            summary: String::new(),
        })
    }

    async fn integrate(&self, request: &IntegrateRequest) -> Result<String> {
        Ok(request.existing_content.clone())
    }

    async fn extract_themes(&self, _raw_text: &str, _existing: &[String]) -> Result<ThemeExtraction> {
        Ok(ThemeExtraction::default())
    }
}

#[tokio::test]
async fn test_dropped_update_leaves_projection_unchanged() {
    let synth = Arc::new(Stalling::default());
    let store = Arc::new(InMemoryStore::new());
    let svc = ProjectionService::new(store.clone(), store, ProjectionEngine::new(synth.clone(), 4));
    svc.add_content(item("c1", "u1", "We lived on a farm.")).await.unwrap();
    let proj = svc
        .create_projection("p1", "Memoir", thematic(&["Family", "Career"]))
        .await
        .unwrap();
    svc.add_content(item("c2", "u1", "Winters were long.")).await.unwrap();
    let before = svc.get_projection(&proj.id).await.unwrap();

    synth.stall.store(true, Ordering::SeqCst);
    let outcome = tokio::time::timeout(
        Duration::from_millis(200),
        svc.update(&proj.id, Some(UpdateMode::Regenerate), None),
    )
    .await;
    assert!(outcome.is_err());

    let after = svc.get_projection(&proj.id).await.unwrap();
    assert_eq!(after, before);
    assert_eq!(after.version(), before.version());

    // The lock was released with the dropped future.
    synth.stall.store(false, Ordering::SeqCst);
    let (updated, _) = svc.update(&proj.id, Some(UpdateMode::Regenerate), None).await.unwrap();
    assert_eq!(updated.version(), before.version() + 1);
}
