//! 任务调度计算
//!
//! 调度配置为标准 5 段 cron（分 时 日 月 周，周 0-6 且 0 = 周日）加 IANA 时区，
//! 在任务时区内求值，结果以 UTC 存储。cron crate 使用 6 段格式（含秒）且周日为 1，
//! 这里负责两者之间的转换。

use std::str::FromStr;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, Result};

/// 任务调度配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSchedule {
    #[serde(rename = "type", default = "default_schedule_type")]
    pub schedule_type: String,
    pub cron: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_schedule_type() -> String {
    "cron".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl JobSchedule {
    /// 从任务行中的 JSON 读取；缺失返回 None
    pub fn from_value(value: Option<&Value>) -> Result<Option<Self>> {
        let value = match value {
            None | Some(Value::Null) => return Ok(None),
            Some(v) => v,
        };
        let obj = value
            .as_object()
            .ok_or_else(|| invalid("schedule 必须为对象"))?;

        let schedule_type = obj.get("type").and_then(Value::as_str).unwrap_or("cron");
        if schedule_type != "cron" {
            return Err(invalid(&format!("不支持的调度类型: {}", schedule_type)));
        }
        let cron = obj
            .get("cron")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| invalid("schedule.cron 不能为空"))?;
        let timezone = obj
            .get("timezone")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("UTC");

        Ok(Some(Self {
            schedule_type: "cron".to_string(),
            cron: cron.trim().to_string(),
            timezone: timezone.trim().to_string(),
        }))
    }

    /// 校验并编译
    pub fn compile(&self) -> Result<CompiledSchedule> {
        if self.schedule_type != "cron" {
            return Err(invalid(&format!("不支持的调度类型: {}", self.schedule_type)));
        }
        let tz = Tz::from_str(&self.timezone)
            .map_err(|_| invalid(&format!("未知时区: {}", self.timezone)))?;
        let expr = to_six_field(&self.cron)?;
        let schedule = Schedule::from_str(&expr)
            .map_err(|e| invalid(&format!("cron 表达式无效 '{}': {}", self.cron, e)))?;
        Ok(CompiledSchedule { schedule, tz })
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "type": self.schedule_type,
            "cron": self.cron,
            "timezone": self.timezone,
        })
    }
}

/// 已编译的调度
pub struct CompiledSchedule {
    schedule: Schedule,
    tz: Tz,
}

impl CompiledSchedule {
    /// base 之后的下一个触发时刻
    pub fn next_after(&self, base: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = base.with_timezone(&self.tz);
        self.schedule
            .after(&local)
            .next()
            .map(|t| t.with_timezone(&Utc))
    }

    /// 不晚于 now 的最近一个触发时刻，即当前调度窗口的起点
    pub fn window_start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let probe = now.trunc_subsecs(0) + Duration::seconds(1);
        let local = probe.with_timezone(&self.tz);
        self.schedule
            .after(&local)
            .next_back()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// 按调度计算下一次运行时间
///
/// 没有调度配置时返回 None；配置无效时报错，任务停留在无下次运行的状态
pub fn compute_next_run_at(base: DateTime<Utc>, schedule: Option<&Value>) -> Result<Option<DateTime<Utc>>> {
    let Some(schedule) = JobSchedule::from_value(schedule)? else {
        return Ok(None);
    };
    let compiled = schedule.compile()?;
    compiled
        .next_after(base)
        .map(Some)
        .ok_or_else(|| invalid(&format!("cron 表达式没有后续触发时间: {}", schedule.cron)))
}

/// 运行桶键：当前调度窗口起点的 UTC 时间（ISO 格式，无时区后缀）
///
/// 无调度或非 cron 调度时退化为当天 UTC 日期
pub fn run_bucket_key(now: DateTime<Utc>, schedule: Option<&Value>) -> Result<String> {
    let fallback = now.date_naive().format("%Y-%m-%d").to_string();
    let schedule = match JobSchedule::from_value(schedule) {
        Ok(Some(s)) => s,
        Ok(None) | Err(_) => return Ok(fallback),
    };
    let compiled = schedule.compile()?;
    Ok(compiled
        .window_start(now)
        .map(|t| t.naive_utc().format("%Y-%m-%dT%H:%M:%S").to_string())
        .unwrap_or(fallback))
}

/// 任务事件 ID：`job:{jobId}:{bucketKey}:{brand}:{profileId}`
pub fn job_event_id(job_id: &uuid::Uuid, bucket_key: &str, brand: &str, profile_id: &str) -> String {
    format!("job:{}:{}:{}:{}", job_id, bucket_key, brand, profile_id)
}

fn invalid(msg: &str) -> EngineError {
    EngineError::InvalidSchedule(msg.to_string())
}

/// 5 段 cron 转为 cron crate 的 6 段格式
fn to_six_field(expr: &str) -> Result<String> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(invalid(&format!(
            "cron 表达式必须为 5 段（分 时 日 月 周）: {}",
            expr
        )));
    }
    let dow = convert_day_of_week(fields[4])?;
    Ok(format!(
        "0 {} {} {} {} {}",
        fields[0], fields[1], fields[2], fields[3], dow
    ))
}

/// 周字段数字转换：0/7 = 周日 → 1，1 = 周一 → 2 ... 6 = 周六 → 7；名称原样保留
fn convert_day_of_week(field: &str) -> Result<String> {
    let mut items = Vec::new();
    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((r, s)) => (r, Some(s)),
            None => (item, None),
        };
        let converted = match range.split_once('-') {
            Some((start, end)) => {
                let (start, end) = (shift_day(start)?, shift_day(end)?);
                // 以 7 结尾的范围（如 5-7）跨过周日
                if let (Ok(s), Ok(e)) = (start.parse::<u32>(), end.parse::<u32>()) {
                    if e < s {
                        if step.is_some() {
                            return Err(invalid(&format!("不支持跨周日的步长范围: {}", item)));
                        }
                        items.push(format!("{}-7", s));
                        items.push(e.to_string());
                        continue;
                    }
                }
                format!("{}-{}", start, end)
            }
            None => shift_day(range)?,
        };
        match step {
            Some(step) => items.push(format!("{}/{}", converted, step)),
            None => items.push(converted),
        }
    }
    Ok(items.join(","))
}

fn shift_day(token: &str) -> Result<String> {
    if token == "*" || token == "?" || token.chars().all(|c| c.is_ascii_alphabetic()) {
        return Ok(token.to_string());
    }
    match token.parse::<u32>() {
        Ok(7) => Ok("1".to_string()),
        Ok(n) if n <= 6 => Ok((n + 1).to_string()),
        _ => Err(invalid(&format!("周字段取值无效: {}", token))),
    }
}
