//! 行动日志：既往动作的有序记录与停滞检测
//!
//! record 按步号严格递增追加；detect_pattern 给出两类启发式信号：
//! stuck_in_loop（最近 N 步动作完全相同）与 no_progress（最近 M 步知识量未增长）。
//! 误报可接受：它们只会让强制收束提前，不会产出错误回答。

use serde_json::Value;

/// 单条行动记录（step 为 1 起的稠密步号）
#[derive(Clone, Debug)]
pub struct ActionRecord {
    pub step: u32,
    /// 动作名：search / visit / reflect / answer / coding
    pub kind: String,
    pub think: String,
    pub params: Value,
}

/// 停滞检测结果
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StagnationReport {
    pub stuck_in_loop: bool,
    pub no_progress: bool,
}

impl StagnationReport {
    pub fn any(&self) -> bool {
        self.stuck_in_loop || self.no_progress
    }
}

/// 行动历史：只增记录 + 每步之后的知识量，窗口大小来自配置
#[derive(Debug)]
pub struct ActionHistory {
    records: Vec<ActionRecord>,
    /// 与 records 对齐：对应步完成后的知识仓大小
    knowledge_sizes: Vec<usize>,
    loop_window: usize,
    progress_window: usize,
}

impl ActionHistory {
    pub fn new(loop_window: usize, progress_window: usize) -> Self {
        Self {
            records: Vec::new(),
            knowledge_sizes: Vec::new(),
            loop_window: loop_window.max(1),
            progress_window: progress_window.max(1),
        }
    }

    /// 追加一条记录与该步完成后的知识量
    pub fn record(&mut self, record: ActionRecord, knowledge_size: usize) {
        debug_assert_eq!(record.step as usize, self.records.len() + 1);
        self.records.push(record);
        self.knowledge_sizes.push(knowledge_size);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ActionRecord] {
        &self.records
    }

    /// 可读日志行，时间正序（最旧在前），最多 max 行（取最近的）
    pub fn diary(&self, max: usize) -> Vec<String> {
        let skip = self.records.len().saturating_sub(max);
        self.records
            .iter()
            .zip(self.knowledge_sizes.iter())
            .skip(skip)
            .map(|(r, size)| {
                format!(
                    "Step {}: {} {} | knowledge={}",
                    r.step,
                    r.kind,
                    truncate(&r.params.to_string(), 120),
                    size
                )
            })
            .collect()
    }

    /// 停滞检测：两个信号相互独立
    pub fn detect_pattern(&self) -> StagnationReport {
        StagnationReport {
            stuck_in_loop: self.detect_loop(),
            no_progress: self.detect_no_progress(),
        }
    }

    /// 最近 loop_window 步的 (kind, 规范化 params) 完全相同
    fn detect_loop(&self) -> bool {
        let n = self.loop_window;
        if self.records.len() < n {
            return false;
        }
        let tail = &self.records[self.records.len() - n..];
        let first = (tail[0].kind.as_str(), tail[0].params.to_string());
        tail.iter()
            .all(|r| r.kind == first.0 && r.params.to_string() == first.1)
    }

    /// 最近 progress_window 步知识仓大小未超过窗口前的水位
    fn detect_no_progress(&self) -> bool {
        let m = self.progress_window;
        let len = self.knowledge_sizes.len();
        if len < m {
            return false;
        }
        let baseline = if len > m {
            self.knowledge_sizes[len - m - 1]
        } else {
            0
        };
        self.knowledge_sizes[len - 1] <= baseline
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(step: u32, kind: &str, params: Value) -> ActionRecord {
        ActionRecord {
            step,
            kind: kind.to_string(),
            think: String::new(),
            params,
        }
    }

    #[test]
    fn test_stuck_in_loop_on_identical_actions() {
        let mut h = ActionHistory::new(3, 3);
        for step in 1..=3 {
            h.record(rec(step, "search", json!({"queries": ["rust"]})), 2);
        }
        assert!(h.detect_pattern().stuck_in_loop);
    }

    #[test]
    fn test_not_stuck_when_params_differ() {
        let mut h = ActionHistory::new(3, 3);
        h.record(rec(1, "search", json!({"queries": ["a"]})), 1);
        h.record(rec(2, "search", json!({"queries": ["b"]})), 2);
        h.record(rec(3, "search", json!({"queries": ["c"]})), 3);
        assert!(!h.detect_pattern().stuck_in_loop);
    }

    #[test]
    fn test_no_progress_when_knowledge_flat() {
        let mut h = ActionHistory::new(3, 3);
        h.record(rec(1, "search", json!({"q": 1})), 5);
        h.record(rec(2, "visit", json!({"t": [0]})), 5);
        h.record(rec(3, "visit", json!({"t": [1]})), 5);
        h.record(rec(4, "reflect", json!({"s": []})), 5);
        assert!(h.detect_pattern().no_progress);
    }

    #[test]
    fn test_progress_inside_window_clears_signal() {
        let mut h = ActionHistory::new(3, 3);
        h.record(rec(1, "search", json!({"q": 1})), 0);
        h.record(rec(2, "search", json!({"q": 2})), 5);
        h.record(rec(3, "visit", json!({"t": [0]})), 5);
        h.record(rec(4, "visit", json!({"t": [1]})), 5);
        // 窗口为步 2..4：窗口前水位 0，窗口末 5 -> 有进展
        assert!(!h.detect_pattern().no_progress);
    }

    #[test]
    fn test_short_history_reports_nothing() {
        let mut h = ActionHistory::new(3, 3);
        h.record(rec(1, "search", json!({})), 0);
        let p = h.detect_pattern();
        assert!(!p.stuck_in_loop);
        assert!(!p.no_progress);
    }

    #[test]
    fn test_diary_is_capped_and_ordered() {
        let mut h = ActionHistory::new(3, 3);
        for step in 1..=5 {
            h.record(rec(step, "search", json!({"n": step})), step as usize);
        }
        let diary = h.diary(2);
        assert_eq!(diary.len(), 2);
        assert!(diary[0].starts_with("Step 4:"));
        assert!(diary[1].starts_with("Step 5:"));
    }
}
