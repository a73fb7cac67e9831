use ndarray::{Array1, ArrayView2, s};

use crate::vocab::Vocabulary;

/// 根据图片的描述符矩阵和视觉词典计算 VLAD 签名
///
/// 每个描述符被分配到最近的视觉单词，残差（描述符 - 中心）累加到该单词
/// 对应的子区间 `[c*D, (c+1)*D)` 中，同一单词的多个残差求和而不是求平均。
/// 最后对整个向量做 L2 归一化。
///
/// 输出长度恒为 K*D，与描述符数量无关；空描述符集返回零向量。
pub fn encode(descriptors: ArrayView2<f32>, vocab: &Vocabulary) -> Array1<f32> {
    let (k, d) = (vocab.len(), vocab.dim());
    let mut signature = Array1::zeros(k * d);

    for descriptor in descriptors.rows() {
        debug_assert_eq!(descriptor.len(), d);
        let cluster = vocab.assign(descriptor);
        let mut block = signature.slice_mut(s![cluster * d..(cluster + 1) * d]);
        block += &descriptor;
        block -= &vocab.centroids().row(cluster);
    }

    l2_normalize(&mut signature);
    signature
}

/// 原地 L2 归一化；范数为零时保持不变（空描述符集的退化情况，不算错误）
pub fn l2_normalize(v: &mut Array1<f32>) {
    let norm = v.dot(v).sqrt();
    if norm > 0.0 {
        *v /= norm;
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array2, array};

    use super::*;

    fn test_vocab() -> Vocabulary {
        Vocabulary::new(array![[0.0, 0.0], [10.0, 10.0]]).unwrap()
    }

    #[test]
    fn test_encode_residuals() {
        let vocab = test_vocab();
        let descriptors = array![[1.0, 0.0], [9.0, 10.0]];
        let signature = encode(descriptors.view(), &vocab);

        // 归一化前的残差向量为 [1, 0, -1, 0]，范数 sqrt(2)
        let expected = array![1.0, 0.0, -1.0, 0.0] / 2f32.sqrt();
        assert_eq!(signature.len(), 4);
        for (a, b) in signature.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_encode_accumulates() {
        // 同一个单词的多个残差应该累加而不是求平均
        let vocab = test_vocab();
        let descriptors = array![[1.0, 0.0], [3.0, 0.0]];
        let signature = encode(descriptors.view(), &vocab);

        // 残差和为 [4, 0]，归一化后为 [1, 0]
        assert!((signature[0] - 1.0).abs() < 1e-6);
        assert!(signature[1].abs() < 1e-6);
    }

    #[test]
    fn test_encode_empty_descriptor_set() {
        let vocab = test_vocab();
        let descriptors = Array2::<f32>::zeros((0, 2));
        let signature = encode(descriptors.view(), &vocab);

        // 空描述符集产生零向量，长度仍然是 K*D
        assert_eq!(signature.len(), 4);
        assert!(signature.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_encode_unit_norm() {
        let vocab = test_vocab();
        let descriptors = array![[2.0, 3.0], [8.0, 12.0], [0.5, 0.5]];
        let signature = encode(descriptors.view(), &vocab);

        let norm = signature.dot(&signature).sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_encode_deterministic() {
        // 相同输入必须产生按位一致的输出
        let vocab = test_vocab();
        let descriptors = array![[1.5, 2.5], [7.0, 11.0], [5.0, 5.0]];
        let a = encode(descriptors.view(), &vocab);
        let b = encode(descriptors.view(), &vocab);
        assert_eq!(a, b);
    }

    #[test]
    fn test_normalize_zero_vector() {
        let mut v = Array1::<f32>::zeros(6);
        l2_normalize(&mut v);
        assert!(v.iter().all(|&x| x == 0.0));
    }
}
