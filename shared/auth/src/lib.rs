pub mod jwt;
pub mod password;
pub mod middleware;
pub mod capabilities;

pub use jwt::*;
pub use password::*;
pub use middleware::*;
pub use capabilities::*;
