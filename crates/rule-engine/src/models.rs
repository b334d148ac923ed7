//! 规则引擎领域模型

use crate::error::{Result, RuleError};
use crate::lexer;
use crate::operators::{Comparator, Connective};
use crate::parser;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::mem;
use std::sync::{Arc, LazyLock};

/// 规则树默认允许的最大深度（含括号嵌套层数）
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// 析构时替换被摘下的子节点
static DETACHED: LazyLock<Arc<Node>> =
    LazyLock::new(|| Arc::new(Node::operand("_", Comparator::Eq, 0)));

/// 比较字面量（数字或字符串）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Number(f64),
    String(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => {
                f.write_str("'")?;
                for c in s.chars() {
                    if c == '\'' || c == '\\' {
                        f.write_str("\\")?;
                    }
                    write!(f, "{}", c)?;
                }
                f.write_str("'")
            }
        }
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<i32> for Literal {
    fn from(value: i32) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// 比较谓词：属性 比较符 字面量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub attribute: String,
    pub comparator: Comparator,
    pub literal: Literal,
}

impl Comparison {
    pub fn new(
        attribute: impl Into<String>,
        comparator: Comparator,
        literal: impl Into<Literal>,
    ) -> Self {
        Self {
            attribute: attribute.into(),
            comparator,
            literal: literal.into(),
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.attribute, self.comparator, self.literal)
    }
}

/// 子树方向，路径由根节点起的方向序列表示
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Branch {
    Left,
    Right,
}

impl Branch {
    /// 解析形如 "root.left.right" 或 "left.right" 的路径，空串或 "root" 表示根节点
    pub fn parse_path(path: &str) -> Result<Vec<Branch>> {
        let path = path.trim();
        let path = path
            .strip_prefix("root")
            .map(|rest| rest.strip_prefix('.').unwrap_or(rest))
            .unwrap_or(path);

        if path.is_empty() {
            return Ok(Vec::new());
        }

        path.split('.')
            .map(|segment| match segment {
                "left" => Ok(Branch::Left),
                "right" => Ok(Branch::Right),
                other => Err(RuleError::Value(format!(
                    "无效的路径段 '{}'，应为 left 或 right",
                    other
                ))),
            })
            .collect()
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => f.write_str("left"),
            Self::Right => f.write_str("right"),
        }
    }
}

/// 规则树节点
///
/// 操作符节点恰好持有两个子节点，操作数节点没有子节点。
/// 构造完成后不可变；子节点通过 `Arc` 共享，合并与替换子树时可复用未改动的部分。
///
/// 解析、合并与 JSON 读取都会把树高限制在 `max_depth` 以内；
/// 直接用构造函数拼出的树不受此限制，求值与渲染前可用 [`Node::check_depth`] 校验。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "NodeRepr")]
pub enum Node {
    Operator {
        connective: Connective,
        left: Arc<Node>,
        right: Arc<Node>,
    },
    Operand(Comparison),
}

impl Node {
    pub fn operand(
        attribute: impl Into<String>,
        comparator: Comparator,
        literal: impl Into<Literal>,
    ) -> Self {
        Self::Operand(Comparison::new(attribute, comparator, literal))
    }

    pub fn operator(connective: Connective, left: impl Into<Arc<Node>>, right: impl Into<Arc<Node>>) -> Self {
        Self::Operator {
            connective,
            left: left.into(),
            right: right.into(),
        }
    }

    pub fn and(left: impl Into<Arc<Node>>, right: impl Into<Arc<Node>>) -> Self {
        Self::operator(Connective::And, left, right)
    }

    pub fn or(left: impl Into<Arc<Node>>, right: impl Into<Arc<Node>>) -> Self {
        Self::operator(Connective::Or, left, right)
    }

    pub fn is_operand(&self) -> bool {
        matches!(self, Self::Operand(_))
    }

    fn children(&self) -> Option<(&Node, &Node)> {
        match self {
            Self::Operand(_) => None,
            Self::Operator { left, right, .. } => Some((left.as_ref(), right.as_ref())),
        }
    }

    /// 规则中引用的全部属性名
    pub fn attributes(&self) -> BTreeSet<String> {
        let mut attributes = BTreeSet::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                Self::Operand(cond) => {
                    attributes.insert(cond.attribute.clone());
                }
                Self::Operator { left, right, .. } => {
                    stack.push(right.as_ref());
                    stack.push(left.as_ref());
                }
            }
        }
        attributes
    }

    /// 节点总数
    pub fn size(&self) -> usize {
        let mut size = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            size += 1;
            if let Some((left, right)) = node.children() {
                stack.push(left);
                stack.push(right);
            }
        }
        size
    }

    /// 树高（单个操作数为 1）
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut stack = vec![(self, 1)];
        while let Some((node, level)) = stack.pop() {
            depth = depth.max(level);
            if let Some((left, right)) = node.children() {
                stack.push((left, level + 1));
                stack.push((right, level + 1));
            }
        }
        depth
    }

    /// 校验树高不超过 `max_depth`，返回实际树高
    pub fn check_depth(&self, max_depth: usize) -> Result<usize> {
        let depth = self.depth();
        if depth > max_depth {
            return Err(RuleError::Value(format!(
                "规则树深度 {} 超过上限 {}",
                depth, max_depth
            )));
        }
        Ok(depth)
    }

    /// 从 JSON 读取规则树，树高上限为 [`DEFAULT_MAX_DEPTH`]
    pub fn from_json(json: &str) -> Result<Node> {
        Self::from_json_with_max_depth(json, DEFAULT_MAX_DEPTH)
    }

    /// 从 JSON 读取规则树
    ///
    /// 关闭 serde_json 的 128 层递归限制，由 serde_stacker 按需扩展栈，
    /// 读取完成后再按 `max_depth` 校验树高。
    pub fn from_json_with_max_depth(json: &str, max_depth: usize) -> Result<Node> {
        let mut de = serde_json::Deserializer::from_str(json);
        de.disable_recursion_limit();
        let node = Node::deserialize(serde_stacker::Deserializer::new(&mut de))?;
        de.end()?;
        node.check_depth(max_depth)?;
        Ok(node)
    }

    /// 按路径取子树
    pub fn subtree(&self, path: &[Branch]) -> Option<&Node> {
        let Some((first, rest)) = path.split_first() else {
            return Some(self);
        };

        match (self, first) {
            (Self::Operator { left, .. }, Branch::Left) => left.subtree(rest),
            (Self::Operator { right, .. }, Branch::Right) => right.subtree(rest),
            (Self::Operand(_), _) => None,
        }
    }

    /// 返回将 `path` 处子树替换为 `subtree` 后的新树，原树保持不变
    pub fn replace(&self, path: &[Branch], subtree: Node) -> Result<Node> {
        let Some((first, rest)) = path.split_first() else {
            return Ok(subtree);
        };

        match self {
            Self::Operand(cond) => Err(RuleError::Value(format!(
                "路径越界: 操作数节点 '{}' 没有 {} 子节点",
                cond, first
            ))),
            Self::Operator {
                connective,
                left,
                right,
            } => {
                let (left, right) = match first {
                    Branch::Left => (Arc::new(left.replace(rest, subtree)?), Arc::clone(right)),
                    Branch::Right => (Arc::clone(left), Arc::new(right.replace(rest, subtree)?)),
                };
                Ok(Self::Operator {
                    connective: *connective,
                    left,
                    right,
                })
            }
        }
    }

    fn detach_children(&mut self, pending: &mut Vec<Arc<Node>>) {
        if let Self::Operator { left, right, .. } = self {
            pending.push(mem::replace(left, Arc::clone(&DETACHED)));
            pending.push(mem::replace(right, Arc::clone(&DETACHED)));
        }
    }

    fn fmt_child(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operand(_) => write!(f, "{}", self),
            Self::Operator { .. } => write!(f, "({})", self),
        }
    }
}

/// 逐个释放独占的子树，深树析构不占用调用栈
impl Drop for Node {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.detach_children(&mut pending);
        while let Some(child) = pending.pop() {
            if let Some(mut node) = Arc::into_inner(child) {
                node.detach_children(&mut pending);
            }
        }
    }
}

/// 渲染为规范规则文本，嵌套的操作符节点总是加括号，可被解析器还原为同构树
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operand(cond) => write!(f, "{}", cond),
            Self::Operator {
                connective,
                left,
                right,
            } => {
                left.fmt_child(f)?;
                write!(f, " {} ", connective)?;
                right.fmt_child(f)
            }
        }
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Node", 4)?;
        match self {
            Self::Operator {
                connective,
                left,
                right,
            } => {
                state.serialize_field("type", &NodeKind::Operator)?;
                state.serialize_field("value", connective)?;
                state.serialize_field("left", left.as_ref())?;
                state.serialize_field("right", right.as_ref())?;
            }
            Self::Operand(cond) => {
                state.serialize_field("type", &NodeKind::Operand)?;
                state.serialize_field("value", cond)?;
                state.serialize_field("left", &Option::<Node>::None)?;
                state.serialize_field("right", &Option::<Node>::None)?;
            }
        }
        state.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum NodeKind {
    Operator,
    Operand,
}

/// 节点值：结构化谓词，或兼容展示用的字符串形式（"AND" / "age > 30"）
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NodeValue {
    Predicate(Comparison),
    Text(String),
}

/// 序列化树的线上形状
#[derive(Debug, Deserialize)]
struct NodeRepr {
    #[serde(rename = "type")]
    kind: NodeKind,
    value: NodeValue,
    #[serde(default)]
    left: Option<Box<Node>>,
    #[serde(default)]
    right: Option<Box<Node>>,
}

impl TryFrom<NodeRepr> for Node {
    type Error = RuleError;

    fn try_from(repr: NodeRepr) -> Result<Self> {
        match repr.kind {
            NodeKind::Operator => {
                let connective = match repr.value {
                    NodeValue::Text(text) => text.parse::<Connective>()?,
                    NodeValue::Predicate(cond) => {
                        return Err(RuleError::Value(format!(
                            "操作符节点的值必须是 AND 或 OR，实际为谓词 '{}'",
                            cond
                        )));
                    }
                };
                match (repr.left, repr.right) {
                    (Some(left), Some(right)) => Ok(Self::Operator {
                        connective,
                        left: Arc::from(left),
                        right: Arc::from(right),
                    }),
                    _ => Err(RuleError::Value(format!(
                        "操作符节点 {} 必须同时包含左右子节点",
                        connective
                    ))),
                }
            }
            NodeKind::Operand => {
                if repr.left.is_some() || repr.right.is_some() {
                    return Err(RuleError::Value("操作数节点不能包含子节点".to_string()));
                }
                let cond = match repr.value {
                    NodeValue::Predicate(cond) => {
                        if !lexer::is_identifier(&cond.attribute) {
                            return Err(RuleError::Value(format!(
                                "属性名 '{}' 不是合法的标识符",
                                cond.attribute
                            )));
                        }
                        cond
                    }
                    NodeValue::Text(text) => parser::parse_comparison(&text)?,
                };
                Ok(Self::Operand(cond))
            }
        }
    }
}

/// 运行时属性值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl AttributeValue {
    /// 获取值的类型名称
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
        }
    }

    fn from_json(key: &str, value: Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(Self::Bool(b)),
            Value::String(s) => Ok(Self::String(s)),
            Value::Number(n) => n.as_f64().map(Self::Number).ok_or_else(|| {
                RuleError::Value(format!("属性 '{}' 的数值无法表示为浮点数", key))
            }),
            other => Err(RuleError::Value(format!(
                "属性 '{}' 的值类型不受支持: {}（仅支持数字、字符串、布尔）",
                key, other
            ))),
        }
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        Self::Number(value as f64)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// 评估上下文 - 属性名到运行时值的映射
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes {
    values: HashMap<String, AttributeValue>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// 链式添加属性
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 从 JSON 对象字符串创建
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// 从 JSON 对象创建，值只能是数字、字符串或布尔
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(RuleError::Value(format!(
                "属性集合必须是 JSON 对象，实际为: {}",
                value
            )));
        };

        let mut values = HashMap::with_capacity(map.len());
        for (key, value) in map {
            let attribute = AttributeValue::from_json(&key, value)?;
            values.insert(key, attribute);
        }

        Ok(Self { values })
    }
}

impl<K, V> FromIterator<(K, V)> for Attributes
where
    K: Into<String>,
    V: Into<AttributeValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attributes = Self::new();
        for (name, value) in iter {
            attributes.insert(name, value);
        }
        attributes
    }
}

/// 评估结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvaluationResult {
    pub matched: bool,
    pub matched_conditions: Vec<String>,
    pub evaluation_trace: Vec<String>,
    pub evaluation_time_us: i64,
}
