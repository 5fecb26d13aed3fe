// ==========================================
// 劳动力产能规划系统 - 产能配置读取 Trait
// ==========================================
// 职责: 定义 Ramp/分配所需的月度配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含默认值回退 (回退由调用方记录告警)
// ==========================================

use crate::domain::calendar::MonthConfiguration;
use async_trait::async_trait;
use std::error::Error;

pub type ConfigReadError = Box<dyn Error + Send + Sync>;

// ==========================================
// CapacityConfigReader Trait
// ==========================================
// 用途: 按 (year, month, worktype) 读取月度产能参数
// 实现者: ConfigManager（从 month_configuration 表读取）
#[async_trait]
pub trait CapacityConfigReader: Send + Sync {
    /// 获取月度配置
    ///
    /// # 返回
    /// - Some(MonthConfiguration): 已配置
    /// - None: 该月该工作类型未配置
    async fn get_month_config(
        &self,
        year: i32,
        month: u32,
        worktype: &str,
    ) -> Result<Option<MonthConfiguration>, ConfigReadError>;
}
