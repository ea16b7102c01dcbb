//! DIE（Debugging Information Entry）
//!
//! デコード済みエントリ（Raw DIE）と、その上のカーソル風ファサードを
//! 提供します。Raw DIEはユニット単位でインターンされ、親オフセットと
//! 次兄弟オフセットは0（未確定）から実オフセットへ高々1回だけ遷移
//! します。ファサードは安価にクローンでき、裏のRaw DIEを共有します。

use std::cell::Cell;
use std::rc::Rc;

use tracing::warn;

use crate::abbrev::Abbreviation;
use crate::encodings::*;
use crate::errors::DwarfError;
use crate::info::Info;
use crate::ranges;
use crate::ranges::Ranges;
use crate::reader::DwarfReader;
use crate::unit::Unit;
use crate::value::{Block, Value};
use crate::Result;

/// アドレス包含判定の結果
///
/// `Unknown`はエラーではなく正常な結果。アドレス情報を持たないDIE
/// （典型的にはnamespaceなど）がこれを返します。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainsAddr {
    Yes,
    No,
    Unknown,
}

/// デコード済みのDIE本体
///
/// 値列は略語のフォーム列と同じ個数・同じ順序。`parent`と
/// `next_sibling`は0が「未確定」を意味し、確定後は二度と書き換わり
/// ません。
#[derive(Debug)]
pub struct RawDie {
    pub(crate) abbrev: Rc<Abbreviation>,
    pub(crate) values: Vec<Value>,
    pub(crate) parent: Cell<u64>,
    pub(crate) first_child: u64,
    pub(crate) next_sibling: Cell<u64>,
}

impl RawDie {
    /// リーダーの現在位置（略語コードの直後）から1エントリ分を
    /// デコードする
    pub(crate) fn decode(
        r: &mut DwarfReader<'_>,
        abbrev: Rc<Abbreviation>,
        unit: &Unit,
        parent: u64,
    ) -> Result<RawDie> {
        let mut values = Vec::with_capacity(abbrev.forms.len());
        let mut next_sibling = 0u64;
        for (i, forment) in abbrev.forms.iter().enumerate() {
            let value = Value::decode(r, forment, unit)?;
            if abbrev.sibling_idx == Some(i) {
                // DW_AT_siblingはユニット相対オフセット
                next_sibling = match value {
                    Value::Addr(v) | Value::Udata(v) => v.wrapping_add(unit.offset),
                    Value::Sdata(v) => (v as u64).wrapping_add(unit.offset),
                    _ => 0,
                };
            }
            values.push(value);
        }

        let first_child;
        if abbrev.has_children {
            // 子を持つなら、値列の直後が最初の子
            first_child = r.offset() as u64;
        } else {
            // 子が無いなら、次のDIEがそのまま次兄弟
            next_sibling = r.offset() as u64;
            first_child = 0;
        }

        Ok(RawDie {
            abbrev,
            values,
            parent: Cell::new(parent),
            first_child,
            next_sibling: Cell::new(next_sibling),
        })
    }

    /// 親オフセットを確定する（未確定のときだけ書く）
    pub(crate) fn set_parent_once(&self, offset: u64) {
        if self.parent.get() == 0 {
            self.parent.set(offset);
        }
    }

    /// 次兄弟オフセットを確定する（未確定のときだけ書く）
    pub(crate) fn set_next_sibling_once(&self, offset: u64) {
        if self.next_sibling.get() == 0 {
            self.next_sibling.set(offset);
        }
    }
}

/// DIEファサード
///
/// 所有ユニットへの参照・オフセット・Raw DIEへの共有ハンドルを持つ
/// 値的なカーソル。クローンは安価で、同じRaw DIEを指し続けます。
#[derive(Debug, Clone)]
pub struct Die {
    info: Rc<Info>,
    unit: Rc<Unit>,
    offset: u64,
    raw: Rc<RawDie>,
}

impl Die {
    pub(crate) fn from_parts(info: Rc<Info>, unit: Rc<Unit>, offset: u64, raw: Rc<RawDie>) -> Die {
        Die {
            info,
            unit,
            offset,
            raw,
        }
    }

    /// .debug_info内でのこのDIEのオフセット
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// 所有ユニット
    pub fn unit(&self) -> &Rc<Unit> {
        &self.unit
    }

    pub(crate) fn info(&self) -> &Rc<Info> {
        &self.info
    }

    pub(crate) fn raw(&self) -> &Rc<RawDie> {
        &self.raw
    }

    /// DIEのタグ
    pub fn tag(&self) -> DwTag {
        self.raw.abbrev.tag
    }

    /// 子を持つか（略語の宣言に従う）
    pub fn has_children(&self) -> bool {
        self.raw.abbrev.has_children
    }

    /// DW_AT_nameの文字列。origin/specification側も探す
    pub fn name(&self) -> Result<Option<String>> {
        match self.attribute(DW_AT_name, false)? {
            Some(attr) => Ok(Some(attr.as_string()?)),
            None => Ok(None),
        }
    }

    /// 最初の子を返す。子が無ければ`None`
    pub fn first_child(&self) -> Result<Option<Die>> {
        self.unit
            .offset_to_die(&self.info, Some(self), self.raw.first_child)
    }

    /// 次の兄弟を返す
    ///
    /// 次兄弟オフセットが未確定なら、このDIEの子を全部デコードして
    /// 確定させてから返す（終端が自分の次兄弟位置を教えてくれる）。
    /// 最後の兄弟なら`None`。
    pub fn next_sibling(&self, parent: &Die) -> Result<Option<Die>> {
        if self.raw.next_sibling.get() == 0 {
            // DW_AT_siblingが無かった。子を走り切ると終端処理が
            // こちらのnext_siblingを埋める
            let mut children = self.children();
            while children.next()?.is_some() {}
        }
        self.unit
            .offset_to_die(&self.info, Some(parent), self.raw.next_sibling.get())
    }

    /// 子のイテレーションカーソルを返す
    ///
    /// 走査には副作用がある: 親が未確定の子DIEを見つけるたびに親
    /// オフセットを確定させる。ユニット中腹を直接デコードしたDIEは
    /// これで正しい親を得る。
    pub fn children(&self) -> Children {
        Children {
            parent: self.clone(),
            cursor: None,
            started: false,
        }
    }

    /// 属性を探す
    ///
    /// `local`が偽なら、DW_AT_abstract_origin / DW_AT_specificationの
    /// 参照先も辿って探す（インライン展開やメンバ関数定義は人間向けの
    /// 属性を参照先にしか持たない）。参照先が自分自身なら辿らない。
    pub fn attribute(&self, name: DwAt, local: bool) -> Result<Option<Attribute>> {
        if let Some(&idx) = self.raw.abbrev.attr_index.get(&name) {
            return Ok(Some(Attribute {
                die: self.clone(),
                idx,
            }));
        }

        const DEREFS: [DwAt; 2] = [DW_AT_abstract_origin, DW_AT_specification];

        // declaration属性と参照属性そのものは参照先に探しに行かない
        if !local && name != DW_AT_declaration && !DEREFS.contains(&name) {
            for deref in DEREFS {
                if let Some(attr) = self.attribute(deref, false)? {
                    if let Some(target) = attr.as_die()? {
                        if !Rc::ptr_eq(&target.raw, &self.raw) {
                            if let Some(found) = target.attribute(name, false)? {
                                return Ok(Some(found));
                            }
                        }
                    }
                }
            }
        }
        Ok(None)
    }

    /// 全属性を宣言順に列挙する
    pub fn attributes(&self) -> Attributes {
        Attributes {
            die: self.clone(),
            idx: 0,
        }
    }

    /// 親DIEのオフセット
    ///
    /// 未確定（ユニット中腹の直接デコード）なら、ルートからツリーを
    /// 全走査して確定させる。走査は同じユニットの他のDIEの親も
    /// ついでに埋める。走査後も未確定なら入力が壊れている。
    pub fn parent_offset(&self) -> Result<u64> {
        if self.raw.parent.get() == 0 && !self.unit.is_root(self) {
            warn!(
                "no parent offset for DIE at {:#x} in unit at {:#x}, walking the DIE tree",
                self.offset, self.unit.offset
            );
            walk(&self.unit.root(&self.info)?)?;
            if self.raw.parent.get() == 0 {
                return Err(DwarfError::InvariantViolated(
                    "tree walk failed to determine a parent offset",
                ));
            }
        }
        Ok(self.raw.parent.get())
    }

    /// このDIEがアドレスを含むか
    ///
    /// low_pc/high_pc両方があれば区間[low, high)（high_pcがデータ型
    /// ならlow相対）で判定する。無ければDW_AT_rangesをレンジリストと
    /// して解決し、low_pc（あれば）を基底にして判定する。どちらも
    /// 無ければ`Unknown`。
    pub fn contains_address(&self, addr: u64) -> Result<ContainsAddr> {
        let low = self.attribute(DW_AT_low_pc, true)?;
        let high = self.attribute(DW_AT_high_pc, true)?;

        if let (Some(low), Some(high)) = (&low, &high) {
            let start = match low.form() {
                DW_FORM_addr => low.as_udata()?,
                form => return Err(DwarfError::UnsupportedForm { form }),
            };
            let end = match high.form() {
                DW_FORM_addr => high.as_udata()?,
                // DWARF 4からhigh_pcはlow_pc相対のデータ型でもよい
                DW_FORM_data1 | DW_FORM_data2 | DW_FORM_data4 | DW_FORM_data8
                | DW_FORM_udata => start + high.as_udata()?,
                form => return Err(DwarfError::UnsupportedForm { form }),
            };
            return Ok(if start <= addr && addr < end {
                ContainsAddr::Yes
            } else {
                ContainsAddr::No
            });
        }

        let base = match &low {
            Some(low) => low.as_udata()?,
            None => 0,
        };
        if let Some(ranges_attr) = self.attribute(DW_AT_ranges, true)? {
            let ranges = ranges_attr.as_ranges()?;
            for &(start, end) in ranges.iter() {
                if start + base <= addr && addr < end + base {
                    return Ok(ContainsAddr::Yes);
                }
            }
            return Ok(ContainsAddr::No);
        }
        Ok(ContainsAddr::Unknown)
    }

    /// アドレスを含む、指定タグの最も深い子孫を探す
    ///
    /// 深さ優先。`No`の部分木は刈る。`Unknown`は子へ降りる（ユニット
    /// ルートがレンジを持たずsubprogramだけが持つ構成が典型）。
    pub fn find_entry_for_addr(
        &self,
        addr: u64,
        tag: DwTag,
        skip_start: bool,
    ) -> Result<Option<Die>> {
        match self.contains_address(addr)? {
            ContainsAddr::No => Ok(None),
            verdict => {
                if verdict == ContainsAddr::Yes && !skip_start && self.tag() == tag {
                    return Ok(Some(self.clone()));
                }
                let mut children = self.children();
                while let Some(child) = children.next()? {
                    if let Some(found) = child.find_entry_for_addr(addr, tag, false)? {
                        return Ok(Some(found));
                    }
                }
                Ok(None)
            }
        }
    }

    /// 型DIEの人間向けの名前を合成する
    ///
    /// 名前を持たない派生型はDW_AT_typeを再帰して
    /// `T *`・`T const`・`Ret(args…)`の形に組み立てる。
    pub fn type_name(ty: Option<&Die>) -> Result<String> {
        let Some(ty) = ty else {
            return Ok("void".to_string());
        };
        if let Some(name) = ty.name()? {
            return Ok(name);
        }

        let base = match ty.attribute(DW_AT_type, false)? {
            Some(attr) => attr.as_die()?,
            None => None,
        };
        match ty.tag() {
            DW_TAG_pointer_type => Ok(format!("{} *", Self::type_name(base.as_ref())?)),
            DW_TAG_const_type => Ok(format!("{} const", Self::type_name(base.as_ref())?)),
            DW_TAG_volatile_type => Ok(format!("{} volatile", Self::type_name(base.as_ref())?)),
            DW_TAG_reference_type => Ok(format!("{}&", Self::type_name(base.as_ref())?)),
            DW_TAG_subroutine_type => {
                let mut out = format!("{}(", Self::type_name(base.as_ref())?);
                let mut sep = "";
                let mut children = ty.children();
                while let Some(arg) = children.next()? {
                    if arg.tag() != DW_TAG_formal_parameter {
                        continue;
                    }
                    let arg_type = match arg.attribute(DW_AT_type, false)? {
                        Some(attr) => attr.as_die()?,
                        None => None,
                    };
                    out.push_str(sep);
                    out.push_str(&Self::type_name(arg_type.as_ref())?);
                    sep = ", ";
                }
                out.push(')');
                Ok(out)
            }
            tag => Ok(format!("(unhandled tag {})", tag)),
        }
    }
}

/// ルートからの全走査。道中の全DIEの親と次兄弟が確定する
fn walk(die: &Die) -> Result<()> {
    let mut children = die.children();
    while let Some(child) = children.next()? {
        walk(&child)?;
    }
    Ok(())
}

/// 子DIEのカーソル
///
/// ファイル順に各子を一度ずつ返す。走査は純粋な観測ではない:
/// 親が未確定の子の親オフセットを確定させ、走り切ると親DIEの
/// 次兄弟オフセットを確定させる。これでツリー走査がO(N)に収まる。
pub struct Children {
    parent: Die,
    cursor: Option<Die>,
    started: bool,
}

impl Children {
    /// 次の子を返す。子が尽きたら`None`
    pub fn next(&mut self) -> Result<Option<Die>> {
        let next = match &self.cursor {
            None if !self.started => {
                self.started = true;
                self.parent.first_child()?
            }
            None => None,
            Some(current) => current.next_sibling(&self.parent)?,
        };
        if let Some(die) = &next {
            die.raw.set_parent_once(self.parent.offset);
        }
        self.cursor = next.clone();
        Ok(next)
    }
}

/// 属性の列挙イテレータ（宣言順）
pub struct Attributes {
    die: Die,
    idx: usize,
}

impl Iterator for Attributes {
    type Item = (DwAt, Attribute);

    fn next(&mut self) -> Option<Self::Item> {
        let forms = &self.die.raw.abbrev.forms;
        if self.idx >= forms.len() {
            return None;
        }
        let idx = self.idx;
        self.idx += 1;
        Some((
            forms[idx].attr,
            Attribute {
                die: self.die.clone(),
                idx,
            },
        ))
    }
}

/// DIEの属性1つ分
///
/// フォームが判別子なので、変換はすべて部分関数。形の合わない変換は
/// `WrongForm`になる。
#[derive(Debug, Clone)]
pub struct Attribute {
    die: Die,
    idx: usize,
}

impl Attribute {
    /// この属性の属性名
    pub fn name(&self) -> DwAt {
        self.die.raw.abbrev.forms[self.idx].attr
    }

    /// この属性のフォーム
    pub fn form(&self) -> DwForm {
        self.die.raw.abbrev.forms[self.idx].form
    }

    fn value(&self) -> &Value {
        &self.die.raw.values[self.idx]
    }

    /// 値を数値として取り出す。フォーム検査は呼び出し側が済ませている
    fn raw_offset(&self) -> u64 {
        match *self.value() {
            Value::Addr(v) | Value::Udata(v) | Value::Signature(v) => v,
            Value::Sdata(v) => v as u64,
            Value::Flag(v) => v as u64,
            Value::Block(b) => b.offset,
        }
    }

    /// 符号なし整数として読む
    pub fn as_udata(&self) -> Result<u64> {
        match self.form() {
            DW_FORM_data1 | DW_FORM_data2 | DW_FORM_data4 | DW_FORM_data8 | DW_FORM_udata
            | DW_FORM_implicit_const | DW_FORM_sec_offset | DW_FORM_addr => Ok(self.raw_offset()),
            form => Err(DwarfError::WrongForm { form }),
        }
    }

    /// 符号付き整数として読む
    pub fn as_sdata(&self) -> Result<i64> {
        match self.form() {
            DW_FORM_data1 | DW_FORM_data2 | DW_FORM_data4 | DW_FORM_data8 | DW_FORM_udata
            | DW_FORM_sdata | DW_FORM_implicit_const => Ok(match *self.value() {
                Value::Udata(v) => v as i64,
                Value::Sdata(v) => v,
                _ => self.raw_offset() as i64,
            }),
            DW_FORM_sec_offset => Ok(self.raw_offset() as i64),
            form => Err(DwarfError::WrongForm { form }),
        }
    }

    /// 真偽フラグとして読む
    pub fn as_flag(&self) -> Result<bool> {
        match self.form() {
            DW_FORM_flag | DW_FORM_flag_present => Ok(matches!(*self.value(), Value::Flag(true))),
            form => Err(DwarfError::WrongForm { form }),
        }
    }

    /// バイト列（block/exprloc）として読む
    pub fn as_block(&self) -> Result<Block> {
        match (self.form(), self.value()) {
            (
                DW_FORM_block | DW_FORM_block1 | DW_FORM_block2 | DW_FORM_block4
                | DW_FORM_exprloc,
                Value::Block(block),
            ) => Ok(*block),
            (form, _) => Err(DwarfError::WrongForm { form }),
        }
    }

    /// 文字列として読む
    ///
    /// strp/line_strp/インライン/strx系/GNU alternateを解決する。
    /// alternateファイルが未設定のGNU_strp_altは番兵文字列を返す。
    pub fn as_string(&self) -> Result<String> {
        let info = &self.die.info;
        match self.form() {
            DW_FORM_strp => info.string_at(self.raw_offset()),
            DW_FORM_line_strp => info.line_string_at(self.raw_offset()),
            DW_FORM_string => info.info_string_at(self.raw_offset()),
            DW_FORM_strx | DW_FORM_strx1 | DW_FORM_strx2 | DW_FORM_strx3 | DW_FORM_strx4 => {
                info.strx(&self.die.unit, self.raw_offset())
            }
            DW_FORM_GNU_strp_alt => match info.alt() {
                Some(alt) => alt.string_at(self.raw_offset()),
                None => Ok("(alt string table unavailable)".to_string()),
            },
            form => Err(DwarfError::WrongForm { form }),
        }
    }

    /// 参照先のDIEとして読む
    ///
    /// ユニット相対参照はユニット基底を足し、ref_addrはinfoセクション
    /// 絶対、GNU_ref_altはalternateファイル側で解決する。まず所有
    /// ユニット内を試し、外れたらカタログ全体で解決する。
    pub fn as_die(&self) -> Result<Option<Die>> {
        let die = &self.die;
        let offset = match self.form() {
            DW_FORM_ref_addr => self.raw_offset(),
            DW_FORM_ref1 | DW_FORM_ref2 | DW_FORM_ref4 | DW_FORM_ref8 | DW_FORM_ref_udata => {
                self.raw_offset() + die.unit.offset
            }
            DW_FORM_GNU_ref_alt => {
                let alt = die.info.alt().ok_or(DwarfError::NoAltReference)?;
                return alt.offset_to_die(self.raw_offset());
            }
            form => return Err(DwarfError::WrongForm { form }),
        };

        // まず所有ユニット内で解決を試みる
        if die.unit.contains_offset(offset) {
            if let Some(found) = die.unit.offset_to_die(&die.info, None, offset)? {
                return Ok(Some(found));
            }
        }
        die.info.offset_to_die(offset)
    }

    /// アドレスレンジ列として読む
    ///
    /// ユニット単位でメモ化される。2回目以降の変換は同じ列を
    /// 再デコードなしで返す。
    pub fn as_ranges(&self) -> Result<Rc<Ranges>> {
        match self.form() {
            DW_FORM_sec_offset | DW_FORM_rnglistx | DW_FORM_data4 | DW_FORM_data8
            | DW_FORM_udata => ranges::resolve(&self.die, self.raw_offset()),
            form => Err(DwarfError::WrongForm { form }),
        }
    }
}
