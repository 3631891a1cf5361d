use crate::aggregate::{aggregate_by_block, BlockFields};
use crate::aliases::AliasRegistry;
use crate::catalog::FieldCatalog;
use crate::children::{process_tier2, process_tier3, ChildSummary};
use crate::config::ConvertSettings;
use crate::error::{ConvertError, ErrorLog, RecordError, Result};
use crate::ingest::{ingest, CrsFallback};
use crate::layout::WorkspaceLayout;
use crate::legacy::{DbfTableReader, LegacyTable, TableReader};
use crate::merge::{process_tier1, MergeSummary};
use crate::progress::{InterruptHandle, Progress, Stage};
use crate::reference::ReferenceResolver;
use crate::shape::{ShapefileReader, VectorReader};
use rusqlite::Connection;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConvertResult {
    Success,
    Error,
    Interrupted,
}

/// What a conversion reads and where it writes.
#[derive(Debug, Clone)]
pub struct ConvertRequest {
    pub lesis_base_dir: PathBuf,
    pub shape_path: PathBuf,
    pub sqlite_path: PathBuf,
    pub settings: ConvertSettings,
}

impl ConvertRequest {
    pub fn new(
        lesis_base_dir: impl Into<PathBuf>,
        shape_path: impl Into<PathBuf>,
        sqlite_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            lesis_base_dir: lesis_base_dir.into(),
            shape_path: shape_path.into(),
            sqlite_path: sqlite_path.into(),
            settings: ConvertSettings::default(),
        }
    }
}

/// Counters of a finished or aborted run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub blocks: usize,
    pub tier1: MergeSummary,
    pub tier2: ChildSummary,
    pub tier3: ChildSummary,
    pub aliases: usize,
    pub reference_scans: usize,
}

/// Everything a per-record stage needs: the open store, the run's lookup
/// state and its sinks.
pub struct StageContext<'a> {
    pub conn: &'a Connection,
    pub settings: &'a ConvertSettings,
    pub layout: &'a WorkspaceLayout,
    pub catalog: &'a FieldCatalog,
    pub tables: &'a dyn TableReader,
    pub resolver: ReferenceResolver<'a>,
    pub aliases: AliasRegistry,
    pub errors: &'a mut ErrorLog,
    pub progress: &'a mut Progress,
}

/// Drives one conversion through its stages, strictly in order.
pub struct Converter {
    request: ConvertRequest,
    tables: Box<dyn TableReader>,
    vectors: Box<dyn VectorReader>,
    crs_fallback: Option<CrsFallback>,
    interrupt: InterruptHandle,
    progress: Progress,
    errors: ErrorLog,
    report: RunReport,
}

impl Converter {
    pub fn new(request: ConvertRequest) -> Self {
        let interrupt = InterruptHandle::new();
        Self {
            request,
            tables: Box::new(DbfTableReader),
            vectors: Box::new(ShapefileReader),
            crs_fallback: None,
            progress: Progress::new(interrupt.clone(), None),
            interrupt,
            errors: ErrorLog::new(),
            report: RunReport::default(),
        }
    }

    pub fn with_table_reader(mut self, reader: impl TableReader + 'static) -> Self {
        self.tables = Box::new(reader);
        self
    }

    pub fn with_vector_reader(mut self, reader: impl VectorReader + 'static) -> Self {
        self.vectors = Box::new(reader);
        self
    }

    pub fn with_crs_fallback(
        mut self,
        fallback: impl Fn() -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.crs_fallback = Some(Box::new(fallback));
        self
    }

    pub fn on_status(mut self, callback: impl FnMut(&str) + Send + 'static) -> Self {
        self.progress = Progress::new(self.interrupt.clone(), Some(Box::new(callback)));
        self
    }

    /// A handle other threads use to stop the run.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    pub fn interrupt(&self) {
        self.interrupt.interrupt();
    }

    pub fn stage(&self) -> Stage {
        self.progress.stage()
    }

    pub fn status(&self) -> &str {
        self.progress.last_message()
    }

    pub fn errors(&self) -> &[RecordError] {
        self.errors.entries()
    }

    pub fn report(&self) -> &RunReport {
        &self.report
    }

    pub fn convert(&mut self) -> ConvertResult {
        self.errors = ErrorLog::new();
        self.report = RunReport::default();
        self.progress.enter(Stage::Started);
        info!(
            base = %self.request.lesis_base_dir.to_string_lossy(),
            shape = %self.request.shape_path.to_string_lossy(),
            sqlite = %self.request.sqlite_path.to_string_lossy(),
            "conversion started"
        );

        match self.run() {
            Ok(()) => {
                self.progress.enter(Stage::Finished);
                ConvertResult::Success
            }
            Err(ConvertError::Interrupted) => {
                self.progress.message("Interrupted");
                info!(stage = self.progress.stage().label(), "conversion interrupted");
                ConvertResult::Interrupted
            }
            Err(e) => {
                let stage = self.progress.stage().label();
                let message = self.progress.message(&e.to_string());
                error!(stage, error = %e, "conversion failed");
                self.errors.push(stage, message, None);
                ConvertResult::Error
            }
        }
    }

    fn run(&mut self) -> Result<()> {
        let request = &self.request;
        let settings = &request.settings;
        let tables: &dyn TableReader = self.tables.as_ref();
        let progress = &mut self.progress;
        let report = &mut self.report;

        remove_existing(&request.sqlite_path)?;

        progress.enter(Stage::Prepare);
        progress.message("Start");
        let layout = WorkspaceLayout::scan(&request.lesis_base_dir)?;
        let catalog = FieldCatalog::load(tables, &layout.fields_table)?;
        let data_sets = layout.data_file_sets()?;
        let Some(first) = data_sets.first() else {
            return Err(ConvertError::Structure(format!(
                "no PHL data files under {}",
                request.lesis_base_dir.to_string_lossy()
            )));
        };
        let Some(phl1) = first.phl1.clone() else {
            return Err(ConvertError::Structure("phl1.dbf not found".into()));
        };
        let Some(phl2) = first.phl2.clone() else {
            return Err(ConvertError::Structure("phl2.dbf not found".into()));
        };
        let phl3 = first.phl3.clone();
        info!(
            reference_dirs = layout.reference_dirs.len(),
            data_dirs = layout.data_dirs.len(),
            fields = catalog.len(),
            "workspace prepared"
        );
        progress.message("Finish");

        progress.enter(Stage::CopyShape);
        progress.message("Start");
        let conn = ingest(
            self.vectors.as_ref(),
            &request.shape_path,
            &request.sqlite_path,
            &settings.videl_layer,
            self.crs_fallback.as_ref(),
            progress,
        )?;
        progress.message("Finish");

        progress.enter(Stage::GenBlocks);
        progress.message("Start");
        report.blocks = aggregate_by_block(
            &conn,
            &settings.videl_layer,
            &settings.kvr_layer,
            BlockFields {
                block: &settings.block_field,
                stand_area: &settings.stand_area_field,
                block_area: &settings.block_area_field,
            },
            progress,
        )?;
        progress.message("Finish");

        let mut ctx = StageContext {
            conn: &conn,
            settings,
            layout: &layout,
            catalog: &catalog,
            tables,
            resolver: ReferenceResolver::new(tables, &layout, &catalog),
            aliases: AliasRegistry::new(),
            errors: &mut self.errors,
            progress,
        };

        ctx.progress.enter(Stage::ProcessTier1);
        ctx.progress.message("Start");
        let tier1 = read_data_table(tables, &phl1)?;
        report.tier1 = process_tier1(&mut ctx, &tier1)?;
        report.reference_scans = ctx.resolver.scans();
        ctx.progress.message("Finish");

        ctx.progress.enter(Stage::ProcessTier2);
        ctx.progress.message("Start");
        let tier2 = read_data_table(tables, &phl2)?;
        report.tier2 = process_tier2(&mut ctx, &tier2)?;
        report.reference_scans = ctx.resolver.scans();
        ctx.progress.message("Finish");

        ctx.progress.enter(Stage::ProcessTier3);
        ctx.progress.message("Start");
        let tier3 = phl3
            .as_deref()
            .map(|p| read_data_table(tables, p))
            .transpose()?;
        report.tier3 = process_tier3(&mut ctx, tier3.as_ref())?;
        report.reference_scans = ctx.resolver.scans();
        ctx.progress.message("Finish");

        ctx.progress.enter(Stage::CreateAliases);
        ctx.progress.message("Start");
        ctx.aliases
            .persist(ctx.conn, &settings.alias_table, ctx.progress)?;
        report.aliases = ctx.aliases.len();
        ctx.progress.message("Finish");

        Ok(())
    }
}

fn remove_existing(path: &Path) -> Result<()> {
    if path.is_file() {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

fn read_data_table(tables: &dyn TableReader, path: &Path) -> Result<LegacyTable> {
    tables.read_table(path).map_err(ConvertError::table)
}
