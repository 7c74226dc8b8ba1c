use crate::backup_id::BackupId;
use crate::constants::backup::{
    MANIFEST_EXTENSION, MANIFEST_PREFIX, PBIX_EXTENSION, REPORTS_DIR_NAME,
};
use crate::error::{PbiError, Result};
use crate::models::BackupRecord;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;

/// 备份存储
///
/// 每个备份占用一个目录：`{root}/{id}/backup_{id}.json`，PBIX 文件位于
/// `{root}/{id}/reports/` 下。旧版本的备份是根目录下的单个清单文件
/// `{root}/backup_{id}.json`，读取时同样支持。
#[derive(Debug, Clone)]
pub struct BackupStorage {
    root: PathBuf,
}

impl BackupStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn manifest_name(id: &BackupId) -> String {
        format!("{MANIFEST_PREFIX}{id}{MANIFEST_EXTENSION}")
    }

    fn backup_dir(&self, id: &BackupId) -> PathBuf {
        self.root.join(id.to_string())
    }

    fn manifest_path(&self, id: &BackupId) -> PathBuf {
        self.backup_dir(id).join(Self::manifest_name(id))
    }

    fn legacy_manifest_path(&self, id: &BackupId) -> PathBuf {
        self.root.join(Self::manifest_name(id))
    }

    fn archive_path(&self, id: &BackupId) -> PathBuf {
        self.root.join(format!("{id}.zip"))
    }

    /// 写入备份清单
    pub async fn save(&self, record: &BackupRecord) -> Result<BackupId> {
        let dir = self.backup_dir(&record.backup_id);
        fs::create_dir_all(&dir).await?;

        let path = self.manifest_path(&record.backup_id);
        let content = serde_json::to_string_pretty(record)?;
        fs::write(&path, content).await?;

        info!("备份清单已保存: {}", path.display());
        Ok(record.backup_id.clone())
    }

    /// 列出所有备份，无法识别的目录和文件会被忽略
    pub async fn list(&self) -> Result<Vec<BackupId>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = BTreeSet::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            let file_type = entry.file_type().await?;

            if file_type.is_dir() {
                let Ok(id) = name.parse::<BackupId>() else {
                    debug!("跳过无法识别的目录: {}", name);
                    continue;
                };
                if fs::try_exists(self.manifest_path(&id)).await? {
                    ids.insert(id);
                }
            } else if let Some(id) = name
                .strip_prefix(MANIFEST_PREFIX)
                .and_then(|rest| rest.strip_suffix(MANIFEST_EXTENSION))
                .and_then(|raw| raw.parse::<BackupId>().ok())
            {
                ids.insert(id);
            }
        }

        Ok(ids.into_iter().collect())
    }

    /// 读取备份清单，先查找目录结构，再查找旧版单文件
    pub async fn load(&self, id: &BackupId) -> Result<BackupRecord> {
        for path in [self.manifest_path(id), self.legacy_manifest_path(id)] {
            match fs::read_to_string(&path).await {
                Ok(content) => {
                    debug!("读取备份清单: {}", path.display());
                    return Ok(serde_json::from_str(&content)?);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(PbiError::not_found(format!("备份 {id}")))
    }

    /// 备份目录（包括尚未写入清单的目录）或旧版清单存在即视为已占用
    pub async fn exists(&self, id: &BackupId) -> Result<bool> {
        Ok(fs::try_exists(self.backup_dir(id)).await?
            || fs::try_exists(self.legacy_manifest_path(id)).await?)
    }

    /// 删除备份及其 PBIX 文件
    pub async fn delete(&self, id: &BackupId) -> Result<()> {
        let dir = self.backup_dir(id);
        let legacy = self.legacy_manifest_path(id);

        if fs::try_exists(&dir).await? {
            fs::remove_dir_all(&dir).await?;
        } else if fs::try_exists(&legacy).await? {
            fs::remove_file(&legacy).await?;
        } else {
            return Err(PbiError::not_found(format!("备份 {id}")));
        }

        let archive = self.archive_path(id);
        if fs::try_exists(&archive).await? {
            fs::remove_file(&archive).await?;
        }

        info!("备份已删除: {}", id);
        Ok(())
    }

    /// 写入导出的 PBIX 文件，返回相对于备份目录的路径
    pub async fn write_pbix(&self, id: &BackupId, report_name: &str, bytes: &[u8]) -> Result<String> {
        let reports_dir = self.backup_dir(id).join(REPORTS_DIR_NAME);
        fs::create_dir_all(&reports_dir).await?;

        let stem = sanitize_file_stem(report_name);
        let mut file_name = format!("{stem}.{PBIX_EXTENSION}");
        let mut n = 1;
        while fs::try_exists(reports_dir.join(&file_name)).await? {
            file_name = format!("{stem}_{n}.{PBIX_EXTENSION}");
            n += 1;
        }

        fs::write(reports_dir.join(&file_name), bytes).await?;
        debug!("PBIX 已写入: {} ({} 字节)", file_name, bytes.len());

        Ok(format!("{REPORTS_DIR_NAME}/{file_name}"))
    }

    /// 读取备份中的 PBIX 文件
    pub async fn read_pbix(&self, id: &BackupId, relative_path: &str) -> Result<Vec<u8>> {
        let relative = Path::new(relative_path);
        if relative_path.is_empty()
            || !relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(PbiError::validation(format!(
                "无效的 PBIX 路径: {relative_path}"
            )));
        }

        match fs::read(self.backup_dir(id).join(relative)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(PbiError::not_found(format!(
                "备份 {id} 中的 PBIX 文件 {relative_path}"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// 将备份打包为 zip 文件，返回 zip 路径
    pub async fn archive(&self, id: &BackupId) -> Result<PathBuf> {
        let dir = self.backup_dir(id);
        let sources: Vec<(PathBuf, PathBuf)> = if fs::try_exists(&dir).await? {
            vec![(dir.clone(), dir)]
        } else {
            let legacy = self.legacy_manifest_path(id);
            if !fs::try_exists(&legacy).await? {
                return Err(PbiError::not_found(format!("备份 {id}")));
            }
            warn!("旧版备份 {} 只包含清单文件", id);
            vec![(legacy, self.root.clone())]
        };

        fs::create_dir_all(&self.root).await?;
        let archive_path = self.archive_path(id);
        let output = archive_path.clone();
        let root = self.root.clone();

        // 压缩在后台线程中执行，避免阻塞异步运行时
        tokio::task::spawn_blocking(move || -> Result<()> {
            // 先写入临时文件再改名，并发打包不会读到写了一半的压缩包
            let temp = NamedTempFile::new_in(&root)?;
            let mut zip = zip::ZipWriter::new(temp.as_file());
            let options =
                SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

            for (source, base) in &sources {
                for entry in WalkDir::new(source) {
                    let entry = entry?;
                    let path = entry.path();
                    if !path.is_file() {
                        continue;
                    }

                    let relative = path
                        .strip_prefix(base)
                        .map_err(|e| PbiError::custom(format!("计算相对路径失败: {e}")))?;
                    // zip 内部统一使用 / 作为分隔符
                    let name = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");

                    zip.start_file(name, options)?;
                    let mut input = File::open(path)?;
                    std::io::copy(&mut input, &mut zip)?;
                }
            }

            zip.finish()?;
            temp.persist(&output).map_err(|e| e.error)?;
            Ok(())
        })
        .await??;

        info!("备份已打包: {}", archive_path.display());
        Ok(archive_path)
    }
}

/// 报表名称转换为安全的文件名
fn sanitize_file_stem(name: &str) -> String {
    let stem: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | ' ' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = stem.trim_matches(|c| c == '.' || c == ' ').to_string();

    if stem.is_empty() {
        "report".to_string()
    } else {
        stem
    }
}
