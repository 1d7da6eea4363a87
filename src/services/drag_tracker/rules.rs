//! Таблица правил распознавания перетаскивания.
//!
//! Правила MapNotify проверяются по порядку, срабатывает первое подходящее.
//! Сигнатура служебного окна KDE проверяется по полям CreateNotify.

use crate::events::{CreateEvent, MapEvent, WindowId};
use crate::services::snapshot::Snapshot;
use crate::services::window_system::WindowOracle;

use super::state::{ActiveAppState, DragMethod, DragState, SnowEffect};

/// Предел глубины при подъёме по предкам окна
const MAX_ANCESTRY_DEPTH: usize = 64;

/// Данные для правил MapNotify. Запросы к оконной системе делаются лениво,
/// только когда правило до них доходит.
pub struct MapFacts<'a> {
    pub event: &'a MapEvent,
    pub root: WindowId,
    pub snapshot: &'a Snapshot,
    pub oracle: &'a dyn WindowOracle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: DragState,
    pub effect: SnowEffect,
}

pub struct MapRule {
    pub name: &'static str,
    /// Правило проверяется только когда ничего не перетаскивается
    pub idle_only: bool,
    pub evaluate: fn(&MapFacts<'_>, &ActiveAppState) -> Option<Transition>,
}

pub const MAP_RULES: [MapRule; 2] = [
    MapRule {
        name: "click-hold",
        idle_only: true,
        evaluate: click_hold,
    },
    MapRule {
        name: "active-app-keyboard",
        idle_only: false,
        evaluate: active_app_keyboard,
    },
];

/// Кнопка мыши зажата, окно с фокусом (или его предок) есть в снимке
fn click_hold(facts: &MapFacts<'_>, _active: &ActiveAppState) -> Option<Transition> {
    let mapped = facts.event.window;
    if mapped.value() == 0 {
        return None;
    }
    if !facts.oracle.pointer_button_held(mapped) {
        return None;
    }

    let focused = facts.oracle.focused_window()?;
    let dragged = resolve_drag_window(facts.snapshot, focused, |w| facts.oracle.parent_of(w))?;

    Some(Transition {
        next: DragState::Dragging {
            window: dragged,
            method: DragMethod::ClickHold,
        },
        effect: SnowEffect::ClearWindow(dragged),
    })
}

/// KDE Plasma: WM показывает служебное окно во весь экран, когда активное
/// окно перемещается с клавиатуры.
///
/// Какое именно окно двигается, не узнать (оно не в фокусе и не обязательно
/// активно), поэтому снег стряхивается со всех окон.
fn active_app_keyboard(facts: &MapFacts<'_>, active: &ActiveAppState) -> Option<Transition> {
    let event = facts.event;
    if event.synthetic || event.override_redirect {
        return None;
    }
    if active.drag_candidate != Some(event.window) {
        return None;
    }
    if event.event_window != facts.root {
        return None;
    }

    let window = active.window?;
    Some(Transition {
        next: DragState::Dragging {
            window,
            method: DragMethod::ActiveAppKeyboard,
        },
        effect: SnowEffect::ClearAll,
    })
}

/// Само окно или ближайший предок, присутствующий в снимке.
///
/// `parent_of` возвращает `None` на корне или при ошибке запроса.
pub fn resolve_drag_window(
    snapshot: &Snapshot,
    window: WindowId,
    parent_of: impl Fn(WindowId) -> Option<WindowId>,
) -> Option<WindowId> {
    let mut node = window;
    for _ in 0..MAX_ANCESTRY_DEPTH {
        if snapshot.contains(node) {
            return Some(node);
        }
        node = parent_of(node)?;
    }
    None
}

/// Параметры, с которыми сравнивается созданное окно
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateContext {
    pub root: WindowId,
    pub overlay_width: u32,
    pub overlay_height: u32,
}

struct SignatureCheck {
    field: &'static str,
    check: fn(&CreateEvent, &CandidateContext) -> bool,
}

fn not_synthetic(e: &CreateEvent, _: &CandidateContext) -> bool {
    !e.synthetic
}

fn child_of_root(e: &CreateEvent, c: &CandidateContext) -> bool {
    e.parent == c.root
}

fn at_origin_x(e: &CreateEvent, _: &CandidateContext) -> bool {
    e.x == 0
}

fn at_origin_y(e: &CreateEvent, _: &CandidateContext) -> bool {
    e.y == 0
}

fn overlay_width(e: &CreateEvent, c: &CandidateContext) -> bool {
    e.width == c.overlay_width
}

fn overlay_height(e: &CreateEvent, c: &CandidateContext) -> bool {
    e.height == c.overlay_height
}

fn no_border(e: &CreateEvent, _: &CandidateContext) -> bool {
    e.border_width == 0
}

fn managed(e: &CreateEvent, _: &CandidateContext) -> bool {
    !e.override_redirect
}

// Пример сигнатуры в KDE Plasma:
//   se? 0  w [0x01886367]  pw [0x00000764]  pos (0,0) @ (1920,1080) b(0) r? 0
const DRAG_WINDOW_SIGNATURE: [SignatureCheck; 8] = [
    SignatureCheck { field: "send_event", check: not_synthetic },
    SignatureCheck { field: "parent", check: child_of_root },
    SignatureCheck { field: "x", check: at_origin_x },
    SignatureCheck { field: "y", check: at_origin_y },
    SignatureCheck { field: "width", check: overlay_width },
    SignatureCheck { field: "height", check: overlay_height },
    SignatureCheck { field: "border_width", check: no_border },
    SignatureCheck { field: "override_redirect", check: managed },
];

/// Проверяет сигнатуру служебного окна перетаскивания; `Err` содержит
/// первое несовпавшее поле.
pub fn match_drag_window_signature(
    event: &CreateEvent,
    context: &CandidateContext,
) -> Result<(), &'static str> {
    match DRAG_WINDOW_SIGNATURE
        .iter()
        .find(|check| !(check.check)(event, context))
    {
        Some(mismatch) => Err(mismatch.field),
        None => Ok(()),
    }
}
