//! 设备到超级表的映射与超级表列结构
//!
//! 映射在启动时从设备目录全量加载，首次见到未知设备时按需单条刷新。
//! 列结构按超级表缓存，缺列时先 DESCRIBE 再建表或加列；结构变更在进程内
//! 串行执行，时序库侧的重复变更按成功处理。

use iothub_core::models::{sanitize_identifier, ColumnDef, ColumnType, PropertySpec, ValueKind};
use iothub_core::traits::{DeviceCatalog, TimeSeriesStore};
use iothub_core::IotResult;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument};

pub struct SchemaRegistry {
    catalog: Arc<dyn DeviceCatalog>,
    store: Arc<dyn TimeSeriesStore>,
    default_text_length: u32,
    tables: RwLock<HashMap<String, String>>,
    columns: RwLock<HashMap<String, HashSet<String>>>,
    ddl: Mutex<()>,
}

impl SchemaRegistry {
    pub fn new(
        catalog: Arc<dyn DeviceCatalog>,
        store: Arc<dyn TimeSeriesStore>,
        default_text_length: u32,
    ) -> Self {
        Self {
            catalog,
            store,
            default_text_length,
            tables: RwLock::new(HashMap::new()),
            columns: RwLock::new(HashMap::new()),
            ddl: Mutex::new(()),
        }
    }

    /// 全量加载设备映射，返回设备数
    pub async fn load(&self) -> IotResult<usize> {
        let mapping = self.catalog.load_table_mapping().await?;
        let count = mapping.len();
        *self.tables.write().await = mapping;
        info!("加载设备超级表映射: {} 台设备", count);
        Ok(count)
    }

    pub async fn table_of(&self, device_id: &str) -> Option<String> {
        self.tables.read().await.get(device_id).cloned()
    }

    /// 从设备目录重新读取单台设备的映射
    pub async fn refresh_device(&self, device_id: &str) -> IotResult<Option<String>> {
        let stable = self.catalog.table_of(device_id).await?;
        match &stable {
            Some(stable) => {
                self.tables
                    .write()
                    .await
                    .insert(device_id.to_string(), stable.clone());
                debug!(device = device_id, stable = %stable, "设备映射已刷新");
            }
            None => {
                self.tables.write().await.remove(device_id);
            }
        }
        Ok(stable)
    }

    pub async fn device_count(&self) -> usize {
        self.tables.read().await.len()
    }

    /// 确保超级表包含 `samples` 中的全部属性列，返回新增的列数
    ///
    /// `samples` 为属性编码到一个样例值的映射，物模型未声明的属性按样例值推断类型。
    #[instrument(skip(self, samples), fields(properties = samples.len()))]
    pub async fn ensure_columns(&self, stable: &str, samples: &BTreeMap<String, Value>) -> IotResult<usize> {
        if self.all_known(stable, samples).await {
            return Ok(0);
        }

        let _guard = self.ddl.lock().await;
        // 等锁期间其他调用方可能已完成变更
        if self.all_known(stable, samples).await {
            return Ok(0);
        }

        let mut specs: Option<HashMap<String, PropertySpec>> = None;
        let mut added = 0;

        let cached = self.columns.read().await.get(stable).cloned();
        let mut known = match cached {
            Some(known) => known,
            None => match self.store.describe(stable).await? {
                Some(existing) => existing.iter().map(|c| c.to_ascii_lowercase()).collect(),
                None => {
                    let declared = self.load_specs(stable, &mut specs).await?;
                    let mut defs: BTreeMap<String, ColumnDef> = declared
                        .values()
                        .map(|spec| self.column_for(spec))
                        .map(|def| (def.name.clone(), def))
                        .collect();
                    for (code, sample) in samples {
                        let name = sanitize_identifier(code);
                        if !defs.contains_key(&name) {
                            let spec = PropertySpec::new(code.clone(), ValueKind::infer(sample));
                            defs.insert(name, self.column_for(&spec));
                        }
                    }
                    let defs: Vec<ColumnDef> = defs.into_values().collect();
                    self.store.create_stable(stable, &defs).await?;
                    info!(stable, columns = defs.len(), "创建超级表");
                    added += defs.len();
                    defs.into_iter().map(|d| d.name).collect()
                }
            },
        };

        for (code, sample) in samples {
            let name = sanitize_identifier(code);
            if known.contains(&name) {
                continue;
            }
            let declared = self.load_specs(stable, &mut specs).await?;
            let column = match declared.get(&name) {
                Some(spec) => self.column_for(spec),
                None => self.column_for(&PropertySpec::new(code.clone(), ValueKind::infer(sample))),
            };
            self.store.add_column(stable, &column).await?;
            info!(stable, column = %column.name, column_type = %column.column_type, "新增属性列");
            known.insert(name);
            added += 1;
        }

        self.columns.write().await.insert(stable.to_string(), known);
        Ok(added)
    }

    async fn all_known(&self, stable: &str, samples: &BTreeMap<String, Value>) -> bool {
        let columns = self.columns.read().await;
        columns.get(stable).is_some_and(|known| {
            samples
                .keys()
                .all(|code| known.contains(&sanitize_identifier(code)))
        })
    }

    /// 物模型声明按需加载一次，以列名为键
    async fn load_specs<'a>(
        &self,
        stable: &str,
        specs: &'a mut Option<HashMap<String, PropertySpec>>,
    ) -> IotResult<&'a HashMap<String, PropertySpec>> {
        if specs.is_none() {
            let declared = self.catalog.property_specs(stable).await?;
            *specs = Some(
                declared
                    .into_iter()
                    .map(|spec| (sanitize_identifier(&spec.code), spec))
                    .collect(),
            );
        }
        Ok(specs.get_or_insert_with(HashMap::new))
    }

    fn column_for(&self, spec: &PropertySpec) -> ColumnDef {
        ColumnDef::new(
            sanitize_identifier(&spec.code),
            ColumnType::from_spec(spec, self.default_text_length),
        )
    }
}
