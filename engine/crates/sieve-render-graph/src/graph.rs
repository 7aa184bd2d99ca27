//! 依赖图构建和拓扑排序
//!
//! 分析 Pass 之间的资源依赖关系，构建 DAG 并进行拓扑排序。

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::resource_handle::{RgBufferId, RgImageId};

/// 依赖分析中使用的资源标识
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgResourceId {
    Buffer(RgBufferId),
    Image(RgImageId),
}

/// 依赖边：从 producer 到 consumer
#[derive(Clone, Debug)]
pub struct DependencyEdge {
    /// 先执行的 Pass 索引
    pub producer: usize,
    /// 后执行的 Pass 索引
    pub consumer: usize,
    /// 产生依赖的资源
    pub resource: RgResourceId,
}

/// 依赖图
///
/// 表示 Pass 之间的依赖关系，用于拓扑排序和执行顺序计算。
pub struct DependencyGraph {
    pass_count: usize,
    /// 邻接表（出边）
    adjacency: Vec<Vec<usize>>,
    in_degrees: Vec<usize>,
    edges: Vec<DependencyEdge>,
}

impl DependencyGraph {
    pub fn new(pass_count: usize) -> Self {
        Self {
            pass_count,
            adjacency: vec![Vec::new(); pass_count],
            in_degrees: vec![0; pass_count],
            edges: Vec::new(),
        }
    }

    /// 添加依赖边，producer 先于 consumer 执行
    pub fn add_edge(&mut self, producer: usize, consumer: usize, resource: RgResourceId) {
        // 避免重复边
        if !self.adjacency[producer].contains(&consumer) {
            self.adjacency[producer].push(consumer);
            self.in_degrees[consumer] += 1;
        }

        self.edges.push(DependencyEdge { producer, consumer, resource });
    }

    /// 执行拓扑排序
    ///
    /// 多个 Pass 同时就绪时，声明顺序靠前的先执行，因此结果是确定的。
    ///
    /// # 返回
    /// - `Ok(order)`: 拓扑排序后的 Pass 索引列表
    /// - `Err(cycle)`: 检测到循环依赖，返回没有被排序的 Pass 索引
    pub fn topological_sort(&self) -> Result<Vec<usize>, Vec<usize>> {
        let mut in_degrees = self.in_degrees.clone();
        let mut ready = BinaryHeap::new();
        let mut result = Vec::with_capacity(self.pass_count);

        for (i, &degree) in in_degrees.iter().enumerate() {
            if degree == 0 {
                ready.push(Reverse(i));
            }
        }

        while let Some(Reverse(node)) = ready.pop() {
            result.push(node);

            for &neighbor in &self.adjacency[node] {
                in_degrees[neighbor] -= 1;
                if in_degrees[neighbor] == 0 {
                    ready.push(Reverse(neighbor));
                }
            }
        }

        if result.len() != self.pass_count {
            let remaining: Vec<usize> = (0..self.pass_count).filter(|&i| in_degrees[i] > 0).collect();
            Err(remaining)
        } else {
            Ok(result)
        }
    }

    /// Pass 的直接前驱
    pub fn get_predecessors(&self, pass_index: usize) -> Vec<usize> {
        self.adjacency.iter().enumerate().filter(|(_, adj)| adj.contains(&pass_index)).map(|(i, _)| i).collect()
    }

    /// Pass 的直接后继
    pub fn get_successors(&self, pass_index: usize) -> &[usize] {
        &self.adjacency[pass_index]
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }
}

/// 依赖分析器
///
/// 按声明顺序扫描 Pass 的读写集合，构建依赖图。
pub struct DependencyAnalyzer;

impl DependencyAnalyzer {
    /// 分析资源依赖，构建依赖图
    ///
    /// 规则：
    /// - 写后读（RAW）：reader 依赖最后一个 writer
    /// - 写后写（WAW）：后一个 writer 依赖前一个 writer
    /// - 读后写（WAR）：writer 依赖上一次写入之后的所有 reader
    pub fn analyze(reads: &[Vec<RgResourceId>], writes: &[Vec<RgResourceId>]) -> DependencyGraph {
        assert_eq!(reads.len(), writes.len());
        let pass_count = reads.len();
        let mut graph = DependencyGraph::new(pass_count);

        let mut last_writer: HashMap<RgResourceId, usize> = HashMap::new();
        let mut readers_since_write: HashMap<RgResourceId, Vec<usize>> = HashMap::new();

        for pass_idx in 0..pass_count {
            for &resource in &reads[pass_idx] {
                if let Some(&writer) = last_writer.get(&resource) {
                    if writer != pass_idx {
                        graph.add_edge(writer, pass_idx, resource);
                    }
                }
                let readers = readers_since_write.entry(resource).or_default();
                if !readers.contains(&pass_idx) {
                    readers.push(pass_idx);
                }
            }

            for &resource in &writes[pass_idx] {
                if let Some(&prev_writer) = last_writer.get(&resource) {
                    if prev_writer != pass_idx {
                        graph.add_edge(prev_writer, pass_idx, resource);
                    }
                }
                if let Some(readers) = readers_since_write.remove(&resource) {
                    for reader in readers.into_iter().filter(|&r| r != pass_idx) {
                        graph.add_edge(reader, pass_idx, resource);
                    }
                }
                last_writer.insert(resource, pass_idx);
            }
        }

        graph
    }
}

#[cfg(test)]
mod tests {
    use slotmap::SlotMap;

    use super::*;

    fn buffer_ids(n: usize) -> Vec<RgResourceId> {
        let mut map: SlotMap<RgBufferId, ()> = SlotMap::with_key();
        (0..n).map(|_| RgResourceId::Buffer(map.insert(()))).collect()
    }

    #[test]
    fn test_chain_dependency() {
        let ids = buffer_ids(2);
        // Pass 0 -> Pass 1 -> Pass 2
        let reads = vec![vec![], vec![ids[0]], vec![ids[1]]];
        let writes = vec![vec![ids[0]], vec![ids[1]], vec![]];

        let graph = DependencyAnalyzer::analyze(&reads, &writes);
        assert_eq!(graph.topological_sort().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_ties_follow_declaration_order() {
        let ids = buffer_ids(3);
        // Pass 0 和 Pass 1 相互独立，Pass 2 读取两者
        let reads = vec![vec![], vec![], vec![ids[0], ids[1]]];
        let writes = vec![vec![ids[0]], vec![ids[1]], vec![ids[2]]];

        let graph = DependencyAnalyzer::analyze(&reads, &writes);
        assert_eq!(graph.topological_sort().unwrap(), vec![0, 1, 2]);
        assert_eq!(graph.get_predecessors(2), vec![0, 1]);
    }

    #[test]
    fn test_write_after_read_edge() {
        let ids = buffer_ids(1);
        // Pass 0 写入，Pass 1 读取，Pass 2 再次写入：Pass 2 必须等待 Pass 1 读取完成
        let reads = vec![vec![], vec![ids[0]], vec![]];
        let writes = vec![vec![ids[0]], vec![], vec![ids[0]]];

        let graph = DependencyAnalyzer::analyze(&reads, &writes);
        assert!(graph.get_successors(1).contains(&2));
        assert!(graph.get_successors(0).contains(&2));
        assert_eq!(graph.topological_sort().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_cycle_detected() {
        let ids = buffer_ids(1);
        let mut graph = DependencyGraph::new(3);
        graph.add_edge(0, 1, ids[0]);
        graph.add_edge(1, 2, ids[0]);
        graph.add_edge(2, 1, ids[0]);

        assert_eq!(graph.topological_sort().unwrap_err(), vec![1, 2]);
    }
}
