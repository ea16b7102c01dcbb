//! Azami DWARFデバッグ情報リーダー
//!
//! このクレートは、コンパイルユニット内のDIE（Debugging Information
//! Entry）ツリーのデコードとナビゲーションを提供します。略語テーブルに
//! 従ったエントリストリームの復号、ユニット横断参照の解決、属性値
//! （アドレス・文字列・バイト列・アドレスレンジ）の遅延具体化を行います。

pub mod errors;
pub mod encodings;
pub mod reader;
pub mod abbrev;
pub mod value;
pub mod unit;
pub mod die;
pub mod ranges;
pub mod info;
pub mod loader;

pub use abbrev::{AbbrevTable, Abbreviation, FormEntry};
pub use die::{Attribute, Attributes, Children, ContainsAddr, Die};
pub use errors::DwarfError;
pub use info::{Info, Sections};
pub use loader::DwarfLoader;
pub use ranges::Ranges;
pub use reader::DwarfReader;
pub use unit::Unit;
pub use value::{Block, Value};

/// DWARF解析の結果型
pub type Result<T> = std::result::Result<T, DwarfError>;
