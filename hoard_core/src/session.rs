//! End-to-end runs over a game directory and a save store.

use crate::config::Config;
use crate::content::{ContentStore, SkippedSource, Source};
use crate::database::{EntryDatabase, Identifier};
use crate::deps::{DependencyClosure, DependencyScanner};
use crate::error::{Error, Result};
use crate::hash::ContentHash;
use crate::resource::{ResourceReference, ResourceType};
use crate::save::SaveStore;
use crate::synth::{SynthesisReport, Synthesizer};
use crate::translation::TranslationTable;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// The read-only side of a run: the overlaid database and its content.
#[derive(Debug)]
pub struct Catalog {
    pub database: EntryDatabase,
    pub content: ContentStore,
    /// Optional sources that failed to load.
    pub skipped: Vec<SkippedSource>,
}

impl Catalog {
    /// Load the primary database, apply patches, and register archives.
    ///
    /// Only the primary database is required. Patches and archives that
    /// fail to load are logged and listed in `skipped`.
    pub fn open(game_dir: &Path, config: &Config) -> Result<Self> {
        let database_path = game_dir.join(&config.database);
        let mut database = EntryDatabase::load(&database_path)?;
        info!(
            database = %database_path.display(),
            rows = database.len(),
            "loaded database"
        );

        let mut skipped = Vec::new();
        for patch in &config.patches {
            let path = game_dir.join(patch);
            match EntryDatabase::load(&path) {
                Ok(overlay) => {
                    info!(patch = %path.display(), rows = overlay.len(), "applied patch");
                    database.patch(&overlay);
                }
                Err(err) => {
                    warn!(patch = %path.display(), error = %err, "skipping patch");
                    skipped.push(SkippedSource {
                        source: Source::Path(path),
                        reason: err.to_string(),
                    });
                }
            }
        }

        let mut content = ContentStore::with_loose_root(game_dir);
        let discovery = content.discover(game_dir, &config.archive_extension);
        skipped.extend(discovery.skipped);

        Ok(Self {
            database,
            content,
            skipped,
        })
    }

    /// Fetch the blob a reference names, through the database for identifiers.
    pub fn resolve(&self, reference: &ResourceReference) -> Option<Vec<u8>> {
        match reference {
            ResourceReference::Hash(hash) => self.content.extract(hash),
            ResourceReference::Identifier(id) => {
                let row = self.database.get(*id)?;
                self.content.extract_row(row)
            }
        }
    }

    /// Load the configured translation table and its patch.
    ///
    /// A table that is missing or undecodable is recorded in `skipped` and
    /// contributes nothing.
    pub fn translations(&mut self, config: &Config) -> TranslationTable {
        let mut table = TranslationTable::new();
        for id in [config.translations, config.translation_patch]
            .into_iter()
            .flatten()
        {
            match self.load_translation_table(id) {
                Ok(overlay) => {
                    info!(table = %id, entries = overlay.len(), "loaded translations");
                    table.patch(&overlay);
                }
                Err(reason) => {
                    warn!(table = %id, %reason, "skipping translations");
                    self.skipped.push(SkippedSource {
                        source: Source::Entry(id),
                        reason,
                    });
                }
            }
        }
        table
    }

    fn load_translation_table(
        &self,
        id: Identifier,
    ) -> std::result::Result<TranslationTable, String> {
        let row = self
            .database
            .get(id)
            .ok_or_else(|| "not in the database".to_string())?;
        let blob = self
            .content
            .extract_row(row)
            .ok_or_else(|| format!("content {} not found", row.hash))?;
        TranslationTable::decode(&blob).map_err(|err| err.to_string())
    }

    /// Everything a catalog entry or blob depends on, transitively.
    pub fn dependencies(&self, reference: ResourceReference) -> Result<DependencyClosure> {
        let blob = self
            .resolve(&reference)
            .ok_or_else(|| Error::object_not_found(reference.to_string()))?;

        Ok(DependencyScanner::new().collect(&blob, |reference| self.resolve(reference)))
    }
}

/// What a populate run did.
#[derive(Debug, Clone, Serialize)]
pub struct PopulateSummary {
    pub save: PathBuf,
    /// New root of the save store.
    pub root: ContentHash,
    pub archives: usize,
    pub report: SynthesisReport,
    /// Existing items newly hearted by the highlight pass.
    pub highlighted: usize,
    /// Optional sources that were skipped.
    pub skipped_sources: Vec<SkippedSource>,
}

/// Add every admissible catalog plan to the profile in a save store.
///
/// The save root is loaded before anything else, so a store without a
/// usable root aborts the run before the catalog is read. The store file is
/// only rewritten at the very end.
pub fn populate(save_path: &Path, game_dir: &Path, config: &Config) -> Result<PopulateSummary> {
    let mut save = SaveStore::open(save_path)?;
    let mut profile = save.load_root()?;

    let mut catalog = Catalog::open(game_dir, config)?;
    let translations = catalog.translations(config);

    let report = Synthesizer::new(
        &catalog.database,
        &catalog.content,
        DependencyScanner::new(),
        &config.rules,
        &translations,
    )
    .run(&mut profile);

    if config.unlock_progression {
        profile.unlock_progression();
    }
    let highlighted = profile.highlight(&config.highlight_tools, &config.highlight_ids);

    let root = save.add(profile.encode(save.revision()));
    save.repoint_root(ResourceType::LocalProfile, root)?;
    save.persist()?;

    info!(
        save = %save_path.display(),
        added = report.added.len(),
        highlighted,
        %root,
        "save store updated"
    );

    Ok(PopulateSummary {
        save: save_path.to_path_buf(),
        root,
        archives: catalog.content.archives().len(),
        report,
        highlighted,
        skipped_sources: catalog.skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::Archive;
    use crate::inventory::{ItemFlags, ToolType};
    use crate::profile::{PROGRESSION_COMPLETED, Profile};
    use crate::resource::encode_plan;
    use crate::synth::RowSkip;
    use crate::testutil::{inventory, plan, row, write_database, write_save};
    use std::fs;
    use tempfile::TempDir;

    /// A game directory with a primary database, one archive, one loose plan
    /// and a translation table.
    fn game_dir(root: &Path) -> PathBuf {
        let game = root.join("game");
        let crate_plan = plan(&inventory(50));
        let ball_plan = plan(&inventory(51));
        let user_plan = encode_plan(
            1,
            Some(&inventory(52)),
            &[ResourceReference::Hash(ContentHash::hash_bytes(b"user"))],
        );
        let loose_plan = plan(&inventory(53));

        let mut table = TranslationTable::new();
        table.insert(1, "Crate");
        table.insert(2, "A wooden crate.");
        let table_blob = table.encode(1);

        fs::create_dir_all(game.join("gamedata/plans")).unwrap();
        fs::write(game.join("gamedata/plans/loose.plan"), &loose_plan).unwrap();
        Archive::create(
            game.join("data/base.farc"),
            &[
                crate_plan.clone(),
                ball_plan.clone(),
                user_plan.clone(),
                table_blob.clone(),
            ],
        )
        .unwrap();

        write_database(
            &game.join("output/blurayguids.map"),
            vec![
                row(10, &crate_plan, "gamedata/plans/crate.plan"),
                row(11, &ball_plan, "gamedata/plans/ball.plan"),
                row(12, &user_plan, "gamedata/plans/user.plan"),
                row(13, &loose_plan, "gamedata/plans/loose.plan"),
                row(14, &ball_plan, "levels/story/ball.plan"),
                row(54800, &table_blob, "languages/en.trans"),
            ],
        );
        game
    }

    #[test]
    fn test_catalog_open_and_patch() {
        let temp_dir = TempDir::new().unwrap();
        let game = game_dir(temp_dir.path());

        let replacement = plan(&inventory(60));
        write_database(
            &game.join("output/brg_patch.map"),
            vec![
                row(11, &replacement, "gamedata/plans/ball_v2.plan"),
                row(99, &replacement, "gamedata/plans/new.plan"),
            ],
        );

        let catalog = Catalog::open(&game, &Config::default()).unwrap();
        assert_eq!(catalog.database.len(), 7);
        assert_eq!(
            catalog.database.get(Identifier::new(11)).unwrap().path,
            "gamedata/plans/ball_v2.plan"
        );
        assert_eq!(catalog.content.archives().len(), 1);
        assert!(catalog.skipped.is_empty());
    }

    #[test]
    fn test_catalog_missing_patch_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let game = game_dir(temp_dir.path());

        let catalog = Catalog::open(&game, &Config::default()).unwrap();
        assert_eq!(catalog.skipped.len(), 1);
        assert_eq!(
            catalog.skipped[0].source,
            Source::Path(game.join("output/brg_patch.map"))
        );
    }

    #[test]
    fn test_catalog_missing_primary_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        assert!(Catalog::open(temp_dir.path(), &Config::default()).is_err());
    }

    #[test]
    fn test_populate() {
        let temp_dir = TempDir::new().unwrap();
        let game = game_dir(temp_dir.path());
        let save_path = temp_dir.path().join("profile.save");
        write_save(&save_path, &Profile::new(), 0x3f8);

        let summary = populate(&save_path, &game, &Config::default()).unwrap();
        assert_eq!(
            summary.report.added,
            vec![Identifier::new(10), Identifier::new(11), Identifier::new(13)]
        );
        assert_eq!(summary.report.skipped.get(&RowSkip::HashReference), Some(&1));
        assert_eq!(summary.report.skipped.get(&RowSkip::DeniedPath), Some(&1));
        assert_eq!(summary.report.skipped.get(&RowSkip::WrongFamily), Some(&1));
        assert_eq!(summary.archives, 1);
        // Neither the default patch database nor the translation patch exists
        assert_eq!(summary.skipped_sources.len(), 2);

        let store = SaveStore::open(&save_path).unwrap();
        assert_eq!(store.root(), Some((ResourceType::LocalProfile, summary.root)));
        let profile = store.load_root().unwrap();
        assert_eq!(profile.items().len(), 3);
        assert_eq!(profile.progression.status, PROGRESSION_COMPLETED);

        let details = profile.items()[0].details.as_ref().unwrap();
        assert_eq!(details.title, "Crate");
        assert_eq!(details.description, "A wooden crate.");
    }

    #[test]
    fn test_populate_twice_is_stable() {
        let temp_dir = TempDir::new().unwrap();
        let game = game_dir(temp_dir.path());
        let save_path = temp_dir.path().join("profile.save");
        write_save(&save_path, &Profile::new(), 1);

        let first = populate(&save_path, &game, &Config::default()).unwrap();
        let after_first = SaveStore::open(&save_path).unwrap().load_root().unwrap();

        let second = populate(&save_path, &game, &Config::default()).unwrap();
        let after_second = SaveStore::open(&save_path).unwrap().load_root().unwrap();

        assert!(second.report.added.is_empty());
        assert_eq!(first.root, second.root);
        assert_eq!(after_first.encode(1), after_second.encode(1));
    }

    #[test]
    fn test_populate_is_deterministic() {
        let temp_dir = TempDir::new().unwrap();
        let game = game_dir(temp_dir.path());
        let first = temp_dir.path().join("a.save");
        let second = temp_dir.path().join("b.save");
        write_save(&first, &Profile::new(), 1);
        write_save(&second, &Profile::new(), 1);

        populate(&first, &game, &Config::default()).unwrap();
        populate(&second, &game, &Config::default()).unwrap();
        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    }

    #[test]
    fn test_populate_highlights_existing() {
        let temp_dir = TempDir::new().unwrap();
        let game = game_dir(temp_dir.path());
        let save_path = temp_dir.path().join("profile.save");

        let mut profile = Profile::new();
        let mut tool = inventory(70);
        tool.tool_type = ToolType::Unphysics;
        profile.add_item(&tool, Identifier::new(500), &TranslationTable::new());
        write_save(&save_path, &profile, 1);

        let summary = populate(&save_path, &game, &Config::default()).unwrap();
        assert_eq!(summary.highlighted, 1);

        let profile = SaveStore::open(&save_path).unwrap().load_root().unwrap();
        assert!(profile.items()[0].flags.contains(ItemFlags::HEARTED));
        assert!(!profile.items()[1].flags.contains(ItemFlags::HEARTED));
    }

    #[test]
    fn test_fatal_root_aborts_before_catalog() {
        let temp_dir = TempDir::new().unwrap();
        let save_path = temp_dir.path().join("profile.save");
        SaveStore::create(&save_path, 1).persist().unwrap();
        let before = fs::read(&save_path).unwrap();

        // No database exists either; the save root must be what fails
        let err = populate(&save_path, temp_dir.path(), &Config::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidSave { .. }));
        assert_eq!(fs::read(&save_path).unwrap(), before);
    }

    #[test]
    fn test_missing_translations_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let game = game_dir(temp_dir.path());
        let save_path = temp_dir.path().join("profile.save");
        write_save(&save_path, &Profile::new(), 1);

        let config = Config {
            translations: Some(Identifier::new(4242)),
            patches: Vec::new(),
            ..Config::default()
        };
        let summary = populate(&save_path, &game, &config).unwrap();

        // The translation patch identifier is not in the catalog either
        let sources: Vec<&Source> = summary.skipped_sources.iter().map(|s| &s.source).collect();
        assert_eq!(
            sources,
            vec![
                &Source::Entry(Identifier::new(4242)),
                &Source::Entry(Identifier::new(69910)),
            ]
        );
        let profile = SaveStore::open(&save_path).unwrap().load_root().unwrap();
        assert_eq!(profile.items()[0].details.as_ref().unwrap().title, "");
    }

    #[test]
    fn test_dependencies() {
        let temp_dir = TempDir::new().unwrap();
        let game = game_dir(temp_dir.path());
        let catalog = Catalog::open(&game, &Config::default()).unwrap();

        let closure = catalog
            .dependencies(ResourceReference::Identifier(Identifier::new(12)))
            .unwrap();
        assert_eq!(
            closure.missing,
            vec![
                ResourceReference::Hash(ContentHash::hash_bytes(b"user")),
                ResourceReference::Identifier(Identifier::new(52)),
            ]
        );
        assert!(closure.found.is_empty());

        assert!(matches!(
            catalog.dependencies(ResourceReference::Identifier(Identifier::new(404))),
            Err(Error::ObjectNotFound { .. })
        ));
    }

    #[test]
    fn test_dependencies_by_hash() {
        let temp_dir = TempDir::new().unwrap();
        let game = game_dir(temp_dir.path());
        let catalog = Catalog::open(&game, &Config::default()).unwrap();

        let row = catalog.database.get(Identifier::new(12)).unwrap().clone();
        let reference: ResourceReference = format!("h{}", row.hash).parse().unwrap();
        assert_eq!(reference, ResourceReference::Hash(row.hash));
        assert_eq!(
            catalog.dependencies(reference).unwrap(),
            catalog
                .dependencies(ResourceReference::Identifier(Identifier::new(12)))
                .unwrap()
        );

        let unknown = ResourceReference::Hash(ContentHash::hash_bytes(b"nowhere"));
        assert!(matches!(
            catalog.dependencies(unknown),
            Err(Error::ObjectNotFound { .. })
        ));
    }
}
