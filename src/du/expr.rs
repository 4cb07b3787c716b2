//! 整数表达式
//!
//! 语法极简：除常量与 `$N` 外，每个子表达式都必须加括号，没有优先级。
//!
//! ```text
//! expr := '(' '-' expr ')' | '(' expr op expr ')' | integer | '$' digits
//! op   := '+' | '-' | '*' | '/' | '%'
//! ```

use std::fmt;

use tracing::debug;

use super::args::TmplArg;
use crate::error::{Result, TadError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinOp {
    fn from_char(c: u8) -> Option<Self> {
        Some(match c {
            b'+' => BinOp::Add,
            b'-' => BinOp::Sub,
            b'*' => BinOp::Mul,
            b'/' => BinOp::Div,
            b'%' => BinOp::Mod,
            _ => return None,
        })
    }

    fn as_char(self) -> char {
        match self {
            BinOp::Add => '+',
            BinOp::Sub => '-',
            BinOp::Mul => '*',
            BinOp::Div => '/',
            BinOp::Mod => '%',
        }
    }
}

/// 表达式树
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// 常量，宽度由取值决定（见 [`Expr::const_width`]）
    Const(i64),
    /// 第 N 个迭代参数（从 0 开始）
    ArgLink(usize),
    /// 一元负号
    Neg(Box<Expr>),
    Binary { op: BinOp, operands: Box<[Expr; 2]> },
}

impl Expr {
    pub fn constant(value: i64) -> Self {
        Expr::Const(value)
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            operands: Box::new([lhs, rhs]),
        }
    }

    /// 常量的存储宽度：超出 32 位有符号范围为 8，否则为 4
    pub fn const_width(&self) -> Option<usize> {
        match self {
            Expr::Const(v) if i32::try_from(*v).is_ok() => Some(4),
            Expr::Const(_) => Some(8),
            _ => None,
        }
    }

    /// 由至多 8 字节的网络序数组构造常量
    pub fn from_be_bytes(arr: &[u8]) -> Result<Self> {
        if arr.is_empty() || arr.len() > 8 {
            return Err(TadError::invalid(format!(
                "constant of {} bytes, expected 1..=8",
                arr.len()
            )));
        }
        let mut raw = [0u8; 8];
        raw[8 - arr.len()..].copy_from_slice(arr);
        Ok(Expr::Const(ntohll(u64::from_ne_bytes(raw)) as i64))
    }

    /// 解析表达式，返回表达式树与消耗的字符数
    ///
    /// 失败时 [`TadError::ExprParse`] 的 `pos` 为出错处之前已消耗的字符数。
    pub fn parse(text: &str) -> Result<(Expr, usize)> {
        let mut p = ExprParser { s: text.as_bytes(), pos: 0 };
        match p.expr() {
            Ok(e) => Ok((e, p.pos)),
            Err(pos) => {
                debug!(text, pos, "表达式解析失败");
                Err(TadError::ExprParse { pos })
            }
        }
    }

    /// 按迭代参数求值，纯函数
    pub fn eval(&self, args: &[TmplArg]) -> Result<i64> {
        match self {
            Expr::Const(v) => Ok(*v),
            Expr::ArgLink(n) => match args.get(*n) {
                Some(TmplArg::Int(v)) => Ok(i64::from(*v)),
                Some(_) => Err(TadError::wrong_nds(format!("argument ${n} is not an integer"))),
                None => Err(TadError::wrong_nds(format!(
                    "argument ${n} out of range, {} arguments given",
                    args.len()
                ))),
            },
            Expr::Neg(e) => Ok(e.eval(args)?.wrapping_neg()),
            Expr::Binary { op, operands } => {
                let [lhs, rhs] = operands.as_ref();
                let a = lhs.eval(args)?;
                let b = rhs.eval(args)?;
                match op {
                    BinOp::Add => Ok(a.wrapping_add(b)),
                    BinOp::Sub => Ok(a.wrapping_sub(b)),
                    BinOp::Mul => Ok(a.wrapping_mul(b)),
                    BinOp::Div => a
                        .checked_div(b)
                        .ok_or_else(|| TadError::wrong_nds(format!("division {a} / {b}"))),
                    BinOp::Mod => a
                        .checked_rem(b)
                        .ok_or_else(|| TadError::wrong_nds(format!("modulo {a} % {b}"))),
                }
            }
        }
    }
}

/// 网络序转主机序（只在小端主机上交换）
pub fn ntohll(n: u64) -> u64 {
    if cfg!(target_endian = "little") {
        n.swap_bytes()
    } else {
        n
    }
}

struct ExprParser<'a> {
    s: &'a [u8],
    pos: usize,
}

impl ExprParser<'_> {
    fn peek(&self) -> Option<u8> {
        self.s.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect_close(&mut self) -> std::result::Result<(), usize> {
        self.skip_ws();
        if self.peek() == Some(b')') {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.pos)
        }
    }

    fn expr(&mut self) -> std::result::Result<Expr, usize> {
        self.skip_ws();
        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                self.skip_ws();
                if self.peek() == Some(b'-') {
                    self.pos += 1;
                    self.skip_ws();
                    // `(-N)` 直接折叠为负常量，允许 2^63
                    if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                        let start = self.pos;
                        let mag = self.magnitude()?;
                        if mag > i64::MIN.unsigned_abs() {
                            return Err(start);
                        }
                        self.expect_close()?;
                        return Ok(Expr::Const((mag as i64).wrapping_neg()));
                    }
                    let sub = self.expr()?;
                    self.expect_close()?;
                    return Ok(Expr::Neg(Box::new(sub)));
                }
                let lhs = self.expr()?;
                self.skip_ws();
                let op = self.peek().and_then(BinOp::from_char).ok_or(self.pos)?;
                self.pos += 1;
                let rhs = self.expr()?;
                self.expect_close()?;
                Ok(Expr::binary(op, lhs, rhs))
            }
            Some(b'$') => {
                self.pos += 1;
                let start = self.pos;
                let n = self.digits(10);
                match n {
                    Some(n) if self.pos > start => Ok(Expr::ArgLink(n as usize)),
                    _ => Err(start),
                }
            }
            Some(c) if c.is_ascii_digit() => self.integer(),
            _ => Err(self.pos),
        }
    }

    fn integer(&mut self) -> std::result::Result<Expr, usize> {
        let start = self.pos;
        match self.magnitude()? {
            v if v <= i64::MAX as u64 => Ok(Expr::Const(v as i64)),
            _ => Err(start),
        }
    }

    /// 无符号整数字面量，按前缀识别进制
    fn magnitude(&mut self) -> std::result::Result<u64, usize> {
        let start = self.pos;
        let value = if self.s[self.pos..].starts_with(b"0x") || self.s[self.pos..].starts_with(b"0X")
        {
            self.pos += 2;
            let digits_at = self.pos;
            let v = self.digits(16);
            if self.pos == digits_at {
                return Err(digits_at);
            }
            v
        } else if self.peek() == Some(b'0') {
            self.pos += 1;
            // 单独的 0 也走八进制分支，值为 0
            self.digits(8)
        } else {
            self.digits(10)
        };
        value.ok_or(start)
    }

    /// 读取连续数字，溢出 u64 时返回 `None`
    fn digits(&mut self, radix: u32) -> Option<u64> {
        let mut acc: Option<u64> = Some(0);
        while let Some(d) = self.peek().and_then(|c| (c as char).to_digit(radix)) {
            acc = acc
                .and_then(|a| a.checked_mul(u64::from(radix)))
                .and_then(|a| a.checked_add(u64::from(d)));
            self.pos += 1;
        }
        acc
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(v) if *v < 0 => write!(f, "(-{})", v.unsigned_abs()),
            Expr::Const(v) => write!(f, "{v}"),
            Expr::ArgLink(n) => write!(f, "${n}"),
            Expr::Neg(e) => write!(f, "(-{e})"),
            Expr::Binary { op, operands } => {
                write!(f, "({} {} {})", operands[0], op.as_char(), operands[1])
            }
        }
    }
}
