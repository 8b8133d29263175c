use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::db::RecordStore;
use crate::error::ImportError;
use crate::models::{
    ColumnMapping, ImportSummary, ImportTarget, ParsedFile, ShopContext, TransformOutcome,
};
use crate::service::csv_import::{duplicate_targets, CsvImportValidator};

/// 会话闲置多久后被清理
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(60 * 60);

/// 导入会话状态. 会话不存在即为 Idle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportState {
    /// 已解析, 已尝试自动映射
    Parsed,
    /// 用户已调整映射
    Mapped,
    /// 正在写入, 拒绝重复提交
    Importing,
}

/// 单次导入向导会话, 归属于打开它的门店
#[derive(Debug, Clone)]
pub struct ImportSession {
    pub id: u64,
    pub target: ImportTarget,
    pub shop: ShopContext,
    pub file: Arc<ParsedFile>,
    pub mapping: ColumnMapping,
    pub state: ImportState,
    touched_at: Instant,
}

impl ImportSession {
    /// Idle -> Parsed
    pub fn open(id: u64, target: ImportTarget, shop: ShopContext, text: &str) -> Result<Self, ImportError> {
        let file = CsvImportValidator::parse(text)?;
        let mapping = CsvImportValidator::new(target.schema()).auto_map(&file.headers);
        Ok(Self {
            id,
            target,
            shop,
            file: Arc::new(file),
            mapping,
            state: ImportState::Parsed,
            touched_at: Instant::now(),
        })
    }

    pub fn validator(&self) -> CsvImportValidator {
        CsvImportValidator::new(self.target.schema())
    }

    /// Parsed/Mapped -> Mapped. 新映射不合法时保留原映射
    pub fn remap(&mut self, pairs: IndexMap<String, Option<String>>) -> Result<(), ImportError> {
        if self.state == ImportState::Importing {
            return Err(ImportError::ImportInProgress(self.id));
        }
        self.mapping = self.validator().replace_mapping(&self.file.headers, pairs)?;
        self.state = ImportState::Mapped;
        self.touched_at = Instant::now();
        Ok(())
    }

    /// 提交前检查映射, 通过后进入 Importing 并返回转换所需的快照
    pub fn begin_import(&mut self) -> Result<ImportJob, ImportError> {
        if self.state == ImportState::Importing {
            return Err(ImportError::ImportInProgress(self.id));
        }

        let missing = self.validator().validate_mapping(&self.mapping);
        if !missing.is_empty() {
            return Err(ImportError::MissingRequiredMapping(missing.into_iter().collect()));
        }

        self.state = ImportState::Importing;
        self.touched_at = Instant::now();
        Ok(ImportJob {
            target: self.target,
            shop: self.shop,
            file: Arc::clone(&self.file),
            mapping: self.mapping.clone(),
        })
    }

    /// 导入未完成: Importing -> Mapped, 保留文件与映射以便重试
    pub fn import_failed(&mut self) {
        self.state = ImportState::Mapped;
        self.touched_at = Instant::now();
    }

    /// 闲置超时且不在写入中
    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.state != ImportState::Importing && self.touched_at.elapsed() >= ttl
    }

    pub fn view(&self) -> SessionView {
        let validator = self.validator();
        SessionView {
            session_id: self.id,
            target: self.target,
            state: self.state,
            headers: self.file.headers.clone(),
            row_count: self.file.rows.len(),
            mapping: self.mapping.clone(),
            missing_required: validator.validate_mapping(&self.mapping).into_iter().collect(),
            duplicate_targets: duplicate_targets(&self.mapping),
        }
    }
}

/// 一次提交的快照, 转换在锁外进行
#[derive(Debug, Clone)]
pub struct ImportJob {
    pub target: ImportTarget,
    pub shop: ShopContext,
    pub file: Arc<ParsedFile>,
    pub mapping: ColumnMapping,
}

impl ImportJob {
    pub fn transform(&self) -> TransformOutcome {
        CsvImportValidator::new(self.target.schema()).transform_all(
            &self.file.rows,
            &self.mapping,
            &self.shop.context_fields(),
        )
    }
}

/// 返回给前端的会话快照
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: u64,
    pub target: ImportTarget,
    pub state: ImportState,
    pub headers: Vec<String>,
    pub row_count: usize,
    pub mapping: ColumnMapping,
    pub missing_required: Vec<String>,
    pub duplicate_targets: Vec<String>,
}

/// 提交期间持有. 未标记完成就被释放 (出错或请求被取消) 时会话回到 Mapped
struct ImportingGuard<'a> {
    sessions: &'a DashMap<u64, ImportSession>,
    session_id: u64,
    completed: bool,
}

impl<'a> ImportingGuard<'a> {
    fn new(sessions: &'a DashMap<u64, ImportSession>, session_id: u64) -> Self {
        Self {
            sessions,
            session_id,
            completed: false,
        }
    }

    /// 导入成功, 结束会话
    fn complete(mut self) {
        self.completed = true;
        self.sessions.remove(&self.session_id);
    }
}

impl Drop for ImportingGuard<'_> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        if let Some(mut session) = self.sessions.get_mut(&self.session_id) {
            session.import_failed();
            tracing::info!("Import session {} returned to mapped", self.session_id);
        }
    }
}

/// 导入服务: 管理会话并执行批量写入
pub struct ImportService {
    store: Arc<dyn RecordStore>,
    sessions: DashMap<u64, ImportSession>,
    next_id: AtomicU64,
    max_upload_bytes: usize,
    session_ttl: Duration,
}

impl ImportService {
    pub fn new(store: Arc<dyn RecordStore>, max_upload_bytes: usize) -> Self {
        Self {
            store,
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
            max_upload_bytes,
            session_ttl: DEFAULT_SESSION_TTL,
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// 选择文件: 解析并自动映射, 开启新会话
    pub fn open(&self, target: ImportTarget, shop: ShopContext, text: &str) -> Result<SessionView, ImportError> {
        self.evict_stale();

        if text.len() > self.max_upload_bytes {
            return Err(ImportError::Parse(format!(
                "file is {} bytes, limit is {}",
                text.len(),
                self.max_upload_bytes
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let session = ImportSession::open(id, target, shop, text)?;
        let view = session.view();
        tracing::info!(
            "Import session {} opened for shop {} ({:?}): {} rows, auto-mapped {}/{} columns",
            id, shop.shop_id, target, view.row_count, session.mapping.len(), view.headers.len()
        );
        self.sessions.insert(id, session);
        Ok(view)
    }

    /// 清理闲置会话, 返回清理数量
    pub fn evict_stale(&self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !s.is_stale(self.session_ttl));
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            tracing::info!("Evicted {} idle import sessions", evicted);
        }
        evicted
    }

    /// 其他门店的会话视为不存在
    fn session_mut(
        &self,
        session_id: u64,
        shop: ShopContext,
    ) -> Result<RefMut<'_, u64, ImportSession>, ImportError> {
        self.sessions
            .get_mut(&session_id)
            .filter(|s| s.shop == shop)
            .ok_or(ImportError::SessionNotFound(session_id))
    }

    pub fn view(&self, session_id: u64, shop: ShopContext) -> Result<SessionView, ImportError> {
        Ok(self.session_mut(session_id, shop)?.view())
    }

    pub fn remap(
        &self,
        session_id: u64,
        shop: ShopContext,
        pairs: IndexMap<String, Option<String>>,
    ) -> Result<SessionView, ImportError> {
        let mut session = self.session_mut(session_id, shop)?;
        session.remap(pairs)?;
        Ok(session.view())
    }

    /// 取消导入, 丢弃会话
    pub fn cancel(&self, session_id: u64, shop: ShopContext) -> bool {
        self.sessions
            .remove_if(&session_id, |_, s| s.shop == shop)
            .is_some()
    }

    /// 批量导入. 成功后会话结束, 其他情况会话保留在 Mapped
    pub async fn commit(&self, session_id: u64, shop: ShopContext) -> Result<ImportSummary, ImportError> {
        // 状态切换在锁内完成, 转换与写库都在锁外
        let job = {
            let mut session = self.session_mut(session_id, shop)?;
            session.begin_import().map_err(|e| {
                tracing::warn!("Import session {} rejected: {}", session_id, e);
                e
            })?
        };
        let guard = ImportingGuard::new(&self.sessions, session_id);

        let target = job.target;
        let outcome = tokio::task::spawn_blocking(move || job.transform())
            .await
            .map_err(|e| ImportError::Interrupted(e.to_string()))?;

        if outcome.kept.is_empty() {
            tracing::warn!(
                "Import session {} has no valid rows ({} skipped)",
                session_id, outcome.skipped
            );
            return Err(ImportError::NoValidRows { skipped: outcome.skipped });
        }

        let inserted = match self.store.insert_batch(target.schema(), shop, &outcome.kept).await {
            Ok(inserted) => inserted,
            Err(e) => {
                tracing::error!("Import session {} insert failed: {}", session_id, e);
                return Err(ImportError::InsertFailure(e.to_string()));
            }
        };
        guard.complete();

        let warning = (outcome.skipped > 0).then(|| {
            format!(
                "{} rows were skipped because a required field was blank or a value was invalid",
                outcome.skipped
            )
        });
        tracing::info!(
            "Import session {} done: shop {}, inserted {}, skipped {}",
            session_id, shop.shop_id, inserted, outcome.skipped
        );
        Ok(ImportSummary {
            inserted,
            skipped: outcome.skipped,
            warning,
        })
    }
}
