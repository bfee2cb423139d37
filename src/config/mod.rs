// 配置模块：环境变量与运行参数

mod env;
mod settings;

pub use env::EnvConfig;
pub use settings::{ModelSettings, StormConfig};
