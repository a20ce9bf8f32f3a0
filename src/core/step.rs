//! 编排状态机的阶段与合法转移表
//!
//! INIT → PLAN → DISPATCH → CONSOLIDATE → EVALUATE → {PLAN | DONE}。
//! EVALUATE → PLAN 是唯一回到早期阶段的边，由 iteration_count 上限约束。

use serde::{Deserialize, Serialize};

/// 编排阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Init,
    Plan,
    Dispatch,
    Consolidate,
    Evaluate,
    Done,
}

/// 合法转移表（未列出的转移一律非法）
const TRANSITIONS: &[(Step, &[Step])] = &[
    (Step::Init, &[Step::Plan, Step::Done]),
    (Step::Plan, &[Step::Dispatch, Step::Done]),
    (Step::Dispatch, &[Step::Consolidate, Step::Done]),
    (Step::Consolidate, &[Step::Evaluate, Step::Done]),
    (Step::Evaluate, &[Step::Plan, Step::Done]),
    (Step::Done, &[]),
];

impl Step {
    /// 从当前阶段允许进入的阶段
    pub fn allowed_next(self) -> &'static [Step] {
        TRANSITIONS
            .iter()
            .find(|(from, _)| *from == self)
            .map(|(_, to)| *to)
            .unwrap_or(&[])
    }

    pub fn can_transition_to(self, next: Step) -> bool {
        self.allowed_next().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self == Step::Done
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Step::Init => "init",
            Step::Plan => "plan",
            Step::Dispatch => "dispatch",
            Step::Consolidate => "consolidate",
            Step::Evaluate => "evaluate",
            Step::Done => "done",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
