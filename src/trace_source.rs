//! Reading unpaired call trees from recorded traces
//!
//! `JsonTraceSource` expects one file per version and test case at
//! `<root>/<version>/<Class#method>.json`:
//!
//! ```json
//! {
//!   "call": "de.example.AppTest#testRun",
//!   "pattern": "public void de.example.AppTest.testRun()",
//!   "children": [
//!     { "call": "de.example.Service#call", "eoi": 1, "children": [] }
//!   ]
//! }
//! ```
//!
//! `pattern` defaults to `call`; `eoi` and `children` are optional.

use crate::call_tree::{CallTree, NodeId};
use crate::config::TestCase;
use crate::error::{CauseSearchError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Deserializer;
use std::fs;
use std::path::{Path, PathBuf};

/// Source of the call tree of one test in one version
pub trait TraceSource {
    /// Read the unpaired, unmeasured tree of `test_case` in `version`
    fn read_tree(&self, version: &str, test_case: &TestCase) -> Result<CallTree>;
}

/// One call of a recorded trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceNode {
    pub call: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eoi: Option<u32>,

    #[serde(default)]
    pub children: Vec<TraceNode>,
}

impl TraceNode {
    pub fn new(call: impl Into<String>) -> Self {
        Self {
            call: call.into(),
            pattern: None,
            eoi: None,
            children: Vec::new(),
        }
    }

    pub fn with_eoi(mut self, eoi: u32) -> Self {
        self.eoi = Some(eoi);
        self
    }

    pub fn with_child(mut self, child: TraceNode) -> Self {
        self.children.push(child);
        self
    }

    fn pattern_or_call(&self) -> &str {
        self.pattern.as_deref().unwrap_or(&self.call)
    }

    /// Build the arena tree of `version`, children in recorded order
    pub fn to_tree(&self, version: &str) -> CallTree {
        let mut tree = CallTree::with_root_eoi(version, &self.call, self.pattern_or_call(), self.eoi);
        let mut stack: Vec<(&TraceNode, NodeId)> = self
            .children
            .iter()
            .rev()
            .map(|child| (child, tree.root()))
            .collect();

        while let Some((node, parent)) = stack.pop() {
            let id = tree.add_child_with_eoi(parent, &node.call, node.pattern_or_call(), node.eoi);
            stack.extend(node.children.iter().rev().map(|child| (child, id)));
        }

        tree
    }

    /// Trace form of an unpaired tree
    pub fn from_tree(tree: &CallTree) -> Self {
        let convert = |id: NodeId| {
            let node = tree.node(id);
            TraceNode {
                call: node.call().to_string(),
                pattern: (node.pattern() != node.call()).then(|| node.pattern().to_string()),
                eoi: node.eoi(),
                children: Vec::new(),
            }
        };

        // Parents precede their children in `subtree`, so walking it in
        // reverse completes every child before its parent is assembled
        let order = tree.subtree(tree.root());
        let mut built: Vec<Option<TraceNode>> = vec![None; tree.len()];
        for &id in order.iter().rev() {
            let mut trace = convert(id);
            trace.children = tree
                .children(id)
                .iter()
                .filter_map(|child| built[child.0].take())
                .collect();
            built[id.0] = Some(trace);
        }
        built[tree.root().0].take().unwrap_or_else(|| convert(tree.root()))
    }

    /// Parse a trace of any nesting depth
    pub fn from_json(content: &str) -> serde_json::Result<Self> {
        let mut deserializer = Deserializer::from_str(content);
        deserializer.disable_recursion_limit();
        let root = TraceNode::deserialize(serde_stacker::Deserializer::new(&mut deserializer))?;
        deserializer.end()?;
        Ok(root)
    }
}

/// `TraceSource` over a directory of JSON trace files
#[derive(Debug, Clone)]
pub struct JsonTraceSource {
    root: PathBuf,
}

impl JsonTraceSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, version: &str, test_case: &TestCase) -> PathBuf {
        self.root.join(version).join(format!("{}.json", test_case))
    }

    /// Record the trace of `test_case` for the version of `tree`
    pub fn write_tree(&self, tree: &CallTree, test_case: &TestCase) -> Result<PathBuf> {
        let path = self.path_for(tree.version(), test_case);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&TraceNode::from_tree(tree))?;
        fs::write(&path, json)?;
        Ok(path)
    }
}

impl TraceSource for JsonTraceSource {
    fn read_tree(&self, version: &str, test_case: &TestCase) -> Result<CallTree> {
        let path = self.path_for(version, test_case);
        let trace_error = |reason: String| CauseSearchError::TraceSource {
            path: path.display().to_string(),
            reason,
        };

        let content = fs::read_to_string(&path).map_err(|e| trace_error(e.to_string()))?;
        let root = TraceNode::from_json(&content).map_err(|e| trace_error(e.to_string()))?;
        let tree = root.to_tree(version);

        tracing::debug!(
            "Read {} calls of {} in version {} (depth {})",
            tree.len(),
            test_case,
            version,
            tree.max_depth()
        );
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_case() -> TestCase {
        TestCase::new("de.example.AppTest", "testRun")
    }

    #[test]
    fn test_read_nested_trace() {
        let dir = TempDir::new().unwrap();
        let source = JsonTraceSource::new(dir.path());
        let path = source.path_for("v1", &test_case());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            r#"{
                "call": "AppTest#testRun",
                "pattern": "public void AppTest.testRun()",
                "children": [
                    { "call": "A#a", "eoi": 1, "children": [ { "call": "B#b" } ] },
                    { "call": "C#c", "eoi": 3 }
                ]
            }"#,
        )
        .unwrap();

        let tree = source.read_tree("v1", &test_case()).unwrap();
        assert_eq!(tree.version(), "v1");
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.node(tree.root()).pattern(), "public void AppTest.testRun()");

        let children = tree.children(tree.root());
        assert_eq!(tree.node(children[0]).call(), "A#a");
        assert_eq!(tree.node(children[0]).eoi(), Some(1));
        assert_eq!(tree.node(children[1]).call(), "C#c");
        let b = tree.children(children[0])[0];
        assert_eq!(tree.node(b).pattern(), "B#b");
        assert_eq!(tree.node(b).depth(), 2);
    }

    #[test]
    fn test_missing_trace_is_an_error() {
        let dir = TempDir::new().unwrap();
        let source = JsonTraceSource::new(dir.path());
        match source.read_tree("v1", &test_case()) {
            Err(CauseSearchError::TraceSource { path, .. }) => {
                assert!(path.ends_with("de.example.AppTest#testRun.json"));
            }
            other => panic!("Expected TraceSource error, got {:?}", other.map(|t| t.len())),
        }
    }

    #[test]
    fn test_malformed_trace_is_an_error() {
        let dir = TempDir::new().unwrap();
        let source = JsonTraceSource::new(dir.path());
        let path = source.path_for("v1", &test_case());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{ "children": [] }"#).unwrap();

        assert!(matches!(
            source.read_tree("v1", &test_case()),
            Err(CauseSearchError::TraceSource { .. })
        ));
    }

    #[test]
    fn test_written_tree_reads_back() {
        let dir = TempDir::new().unwrap();
        let source = JsonTraceSource::new(dir.path());

        let trace = TraceNode::new("AppTest#testRun")
            .with_child(TraceNode::new("A#a").with_eoi(1).with_child(TraceNode::new("B#b")))
            .with_child(TraceNode::new("A#a").with_eoi(2));
        let tree = trace.to_tree("v2");
        source.write_tree(&tree, &test_case()).unwrap();

        let read = source.read_tree("v2", &test_case()).unwrap();
        assert_eq!(TraceNode::from_tree(&read), trace);
    }

    #[test]
    fn test_deep_trace_reads_back() {
        let dir = TempDir::new().unwrap();
        let source = JsonTraceSource::new(dir.path());

        let mut tree = CallTree::new("v1", "AppTest#testRun", "AppTest#testRun");
        let mut parent = tree.root();
        for depth in 1..=250 {
            parent = tree.add_child(parent, format!("Frame#level{}", depth), format!("Frame.level{}()", depth));
        }
        tree.add_child(tree.root(), "Log#write", "Log#write");
        source.write_tree(&tree, &test_case()).unwrap();

        let read = source.read_tree("v1", &test_case()).unwrap();
        assert_eq!(read.len(), 252);
        assert_eq!(read.max_depth(), 250);
        assert_eq!(read.node(read.children(read.root())[1]).call(), "Log#write");
        assert_eq!(TraceNode::from_tree(&read), TraceNode::from_tree(&tree));
    }

    #[test]
    fn test_trailing_content_is_an_error() {
        assert!(TraceNode::from_json(r#"{ "call": "A#a" } { "call": "B#b" }"#).is_err());
        assert_eq!(TraceNode::from_json(r#" { "call": "A#a" } "#).unwrap(), TraceNode::new("A#a"));
    }
}
