use thiserror::Error;

#[derive(Error, Debug)]
pub enum XsnowError {
    #[error("Не удалось подключиться к X-серверу: {0}")]
    X11Connect(#[from] x11rb::errors::ConnectError),

    #[error("Соединение с X-сервером потеряно: {0}")]
    X11Connection(#[from] x11rb::errors::ConnectionError),

    #[error("Ошибка ответа X-сервера: {0}")]
    X11Reply(#[from] x11rb::errors::ReplyError),

    #[error("Ошибка запроса X-сервера: {0}")]
    X11ReplyOrId(#[from] x11rb::errors::ReplyOrIdError),

    #[error("Виртуальное рабочее пространство потеряно")]
    WorkspaceLost,

    #[error("Окно снега потеряно: {0}")]
    OverlayLost(String),

    #[error("Внутренняя ошибка: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, XsnowError>;

// Удобные макросы для создания ошибок
#[macro_export]
macro_rules! xsnow_error {
    (overlay_lost, $($arg:tt)*) => {
        $crate::error::XsnowError::OverlayLost(format!($($arg)*))
    };
    (internal, $($arg:tt)*) => {
        $crate::error::XsnowError::Internal(format!($($arg)*))
    };
}
