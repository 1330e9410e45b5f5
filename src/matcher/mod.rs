//! 解析結果とカタログの照合（スタイリスト・クーポン・テンプレート）

pub mod coupon;
pub mod stylist;
pub mod template;

pub use coupon::CouponSelector;
pub use stylist::StylistSelector;
pub use template::TemplateMatcher;
